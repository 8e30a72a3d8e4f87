use flow_stage::{config::StageConfig, flow};

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => StageConfig::load(path)?,
        None => StageConfig::default(),
    };
    flow::run(config)
}
