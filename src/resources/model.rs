use anyhow::{Context as _, anyhow, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, SquareMatrix, Vector3, Vector4};

use crate::{
    data_structures::{
        environment::yield_now,
        model::{ImageData, Material, MeshData, ModelData, ModelVertex},
    },
    resources::{AssetSource, resolve_relative},
};

/// Decode a `.gltf` or `.glb` file. External buffers and images are fetched
/// through `source`, relative to `url`.
///
/// Node transforms are baked into the vertices, so the meshes are drawn with
/// the model node's pose alone.
pub async fn decode_model<S: AssetSource + ?Sized>(
    bytes: &[u8],
    url: &str,
    source: &S,
) -> anyhow::Result<ModelData> {
    let gltf = gltf::Gltf::from_slice(bytes).context("invalid glTF document")?;

    let mut buffers: Vec<Vec<u8>> = Vec::new();
    for buffer in gltf.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .clone()
                .ok_or_else(|| anyhow!("buffer {} refers to a missing GLB chunk", buffer.index()))?,
            gltf::buffer::Source::Uri(uri) => fetch_uri(url, uri, source).await?,
        };
        if data.len() < buffer.length() {
            bail!(
                "buffer {} holds {} bytes, {} declared",
                buffer.index(),
                data.len(),
                buffer.length()
            );
        }
        buffers.push(data);
    }

    let mut materials = Vec::new();
    for material in gltf.materials() {
        let pbr = material.pbr_metallic_roughness();
        let base_colour_texture = match pbr.base_color_texture() {
            Some(info) => Some(load_texture(info.texture(), &buffers, url, source).await?),
            None => None,
        };
        let metallic_roughness_texture = match pbr.metallic_roughness_texture() {
            Some(info) => Some(load_texture(info.texture(), &buffers, url, source).await?),
            None => None,
        };
        let emissive_texture = match material.emissive_texture() {
            Some(info) => Some(load_texture(info.texture(), &buffers, url, source).await?),
            None => None,
        };
        let index = materials.len();
        materials.push(Material {
            name: material
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("material {index}")),
            base_colour: pbr.base_color_factor(),
            base_colour_texture,
            metallic: pbr.metallic_factor(),
            roughness: pbr.roughness_factor(),
            metallic_roughness_texture,
            emissive: material.emissive_factor(),
            emissive_texture,
        });
    }
    // Primitives without a material use the glTF default.
    let default_material = materials.len();
    materials.push(Material::default());

    let mut meshes = Vec::new();
    let scene = gltf
        .default_scene()
        .or_else(|| gltf.scenes().next())
        .ok_or_else(|| anyhow!("glTF file has no scene"))?;
    let mut stack: Vec<(gltf::Node, Matrix4<f32>)> = scene
        .nodes()
        .map(|node| (node, Matrix4::identity()))
        .collect();
    while let Some((node, parent)) = stack.pop() {
        let world = parent * Matrix4::from(node.transform().matrix());
        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::warn!(
                        "skipping {:?} primitive of mesh {:?} in {url}",
                        primitive.mode(),
                        mesh.name()
                    );
                    continue;
                }
                let material = primitive
                    .material()
                    .index()
                    .unwrap_or(default_material);
                meshes.push(read_primitive(&primitive, &buffers, world, material, &mesh)?);
            }
        }
        stack.extend(node.children().map(|child| (child, world)));
    }
    if meshes.is_empty() {
        log::warn!("{url} contains no triangle meshes");
    }

    Ok(ModelData { meshes, materials })
}

fn read_primitive(
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
    world: Matrix4<f32>,
    material: usize,
    mesh: &gltf::Mesh,
) -> anyhow::Result<MeshData> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| anyhow!("primitive of mesh {:?} has no positions", mesh.name()))?
        .collect();

    let normal_matrix = normal_matrix(world);
    let mut vertices: Vec<ModelVertex> = positions
        .iter()
        .map(|p| {
            let p = world * Vector4::new(p[0], p[1], p[2], 1.0);
            ModelVertex {
                position: [p.x, p.y, p.z],
                normal: [0.0, 0.0, 1.0],
                tex_coords: [0.0, 0.0],
            }
        })
        .collect();
    if let Some(normals) = reader.read_normals() {
        for (vertex, normal) in vertices.iter_mut().zip(normals) {
            let n = normal_matrix * Vector3::from(normal);
            let n = if n.magnitude2() > 0.0 { n.normalize() } else { n };
            vertex.normal = n.into();
        }
    }
    if let Some(tex_coords) = reader.read_tex_coords(0) {
        for (vertex, uv) in vertices.iter_mut().zip(tex_coords.into_f32()) {
            vertex.tex_coords = uv;
        }
    }
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertices.len() as u32).collect(),
    };
    if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
        bail!(
            "mesh {:?} indexes vertex {bad} of {}",
            mesh.name(),
            vertices.len()
        );
    }

    Ok(MeshData {
        name: mesh.name().unwrap_or("unnamed mesh").to_string(),
        vertices,
        indices,
        material,
    })
}

/// Inverse transpose of the upper 3x3, identity for degenerate transforms.
fn normal_matrix(world: Matrix4<f32>) -> Matrix3<f32> {
    let upper = Matrix3::from_cols(
        world.x.truncate(),
        world.y.truncate(),
        world.z.truncate(),
    );
    upper
        .invert()
        .map(|inverse| inverse.transpose())
        .unwrap_or_else(Matrix3::identity)
}

async fn fetch_uri<S: AssetSource + ?Sized>(
    base: &str,
    uri: &str,
    source: &S,
) -> anyhow::Result<Vec<u8>> {
    if let Some(data) = uri.strip_prefix("data:") {
        return decode_data_uri(data);
    }
    let resolved = resolve_relative(base, uri);
    source
        .fetch(&resolved)
        .await
        .with_context(|| format!("cannot fetch {resolved}"))
}

/// Payload of a `data:` URI with the scheme already stripped. Only the base64
/// form shows up in glTF exports.
fn decode_data_uri(data: &str) -> anyhow::Result<Vec<u8>> {
    let (header, payload) = data
        .split_once(',')
        .ok_or_else(|| anyhow!("data URI has no payload"))?;
    if !header.ends_with(";base64") {
        bail!("data URI with media type {header:?} is not base64 encoded");
    }
    STANDARD
        .decode(payload)
        .context("data URI holds invalid base64")
}

async fn load_texture<S: AssetSource + ?Sized>(
    texture: gltf::Texture<'_>,
    buffers: &[Vec<u8>],
    base: &str,
    source: &S,
) -> anyhow::Result<ImageData> {
    load_image(texture.source().source(), buffers, base, source).await
}

async fn load_image<S: AssetSource + ?Sized>(
    image: gltf::image::Source<'_>,
    buffers: &[Vec<u8>],
    base: &str,
    source: &S,
) -> anyhow::Result<ImageData> {
    let bytes = match image {
        gltf::image::Source::View { view, .. } => {
            let buffer = buffers
                .get(view.buffer().index())
                .ok_or_else(|| anyhow!("image view points at a missing buffer"))?;
            let end = view.offset() + view.length();
            buffer
                .get(view.offset()..end)
                .ok_or_else(|| anyhow!("image view exceeds its buffer"))?
                .to_vec()
        }
        gltf::image::Source::Uri { uri, .. } => fetch_uri(base, uri, source).await?,
    };
    let rgba = image::load_from_memory(&bytes)
        .context("cannot decode material texture")?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    // decoding a large texture is a long stretch without a frame
    yield_now().await;
    Ok(ImageData {
        width,
        height,
        pixels: rgba.into_raw(),
    })
}
