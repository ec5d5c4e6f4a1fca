// Copyright 2024 the Glint Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Renders a Wavefront OBJ mesh to a Netpbm image with a Lambert-shaded
//! point light.

use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;

use glint::math::{transform, Vec3, Vec4};
use glint::{
    compile, devices, platforms, Buffer, CompileOptions, Context, ContextGuard, DeviceKind,
    Float3, Float4, KernelArgs, Rasterizer, StorageClass,
};

const VERTEX_SHADER: &str = r#"
@group(0) @binding(0) var<storage, read> AttributeVertex: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read> AttributeNormal: array<vec3<f32>>;
// Row-major: row i of the model-view-projection matrix.
@group(0) @binding(2) var<storage, read> UniformMatrix: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read_write> InterpPosition: array<vec4<f32>>;
@group(0) @binding(4) var<storage, read_write> InterpNormal: array<vec3<f32>>;
@group(0) @binding(5) var<storage, read_write> InterpPositionWorld: array<vec4<f32>>;

@compute @workgroup_size(64)
fn vertex_shader(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= arrayLength(&AttributeVertex)) {
        return;
    }
    let v = AttributeVertex[i];
    var p = vec4(
        dot(UniformMatrix[0], v),
        dot(UniformMatrix[1], v),
        dot(UniformMatrix[2], v),
        dot(UniformMatrix[3], v),
    );
    p = p / p.w;
    InterpPosition[i] = p;
    InterpNormal[i] = AttributeNormal[i];
    InterpPositionWorld[i] = v;
}
"#;

const FRAGMENT_SHADER: &str = r#"
@group(0) @binding(0) var<storage, read> InterpNormal: array<vec3<f32>>;
@group(0) @binding(1) var<storage, read> InterpPositionWorld: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> gclFragPos: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read> gclFragInfo: array<vec4<f32>>;
@group(0) @binding(4) var<storage, read_write> gclColorBuffer: array<vec4<f32>>;
@group(0) @binding(5) var<storage, read> gclBufferSize: array<u32>;
@group(0) @binding(6) var<storage, read> gclDepthBuffer: array<i32>;
@group(0) @binding(7) var<storage, read> gclFragmentSize: array<u32>;

@compute @workgroup_size(64)
fn fragment_shader(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= gclFragmentSize[0]) {
        return;
    }
    let p = gclFragPos[i];
    let info = gclFragInfo[i];
    let coord = u32(p.y) * gclBufferSize[0] + u32(p.x);
    // Only the fragment that won the depth race shades this pixel.
    if (gclDepthBuffer[coord] != bitcast<i32>(p.z)) {
        return;
    }
    let base = u32(info.w) * 3u;
    let normal = normalize(
        InterpNormal[base] * info.x
            + InterpNormal[base + 1u] * info.y
            + InterpNormal[base + 2u] * info.z,
    );
    var world = InterpPositionWorld[base] * info.x
        + InterpPositionWorld[base + 1u] * info.y
        + InterpPositionWorld[base + 2u] * info.z;
    world = world / world.w;
    let light = normalize(vec4(-15.0, 30.0, 100.0, 1.0) - world).xyz;
    let c = dot(normal, light);
    gclColorBuffer[coord] = vec4(c, c, c, 1.0) * 255.0;
}
"#;

fn dot4(a: Float4, b: Float4) -> f32 {
    a.x * b.x + a.y * b.y + a.z * b.z + a.w * b.w
}

fn vertex_shader_cpu(n: u32, args: &KernelArgs) {
    let attr_vertex = args.buf::<Float4>(0);
    let attr_normal = args.buf::<Float3>(1);
    let matrix = args.buf::<Float4>(2);
    let mut out_position = args.buf::<Float4>(3);
    let mut out_normal = args.buf::<Float3>(4);
    let mut out_world = args.buf::<Float4>(5);

    for i in 0..(n as usize).min(attr_vertex.len()) {
        let v = attr_vertex[i];
        let p = Float4::new(
            dot4(matrix[0], v),
            dot4(matrix[1], v),
            dot4(matrix[2], v),
            dot4(matrix[3], v),
        );
        let inv_w = 1.0 / p.w;
        out_position[i] = Float4::new(p.x * inv_w, p.y * inv_w, p.z * inv_w, 1.0);
        out_normal[i] = attr_normal[i];
        out_world[i] = v;
    }
}

fn fragment_shader_cpu(n: u32, args: &KernelArgs) {
    let interp_normal = args.buf::<Float3>(0);
    let interp_world = args.buf::<Float4>(1);
    let frag_pos = args.buf::<Float4>(2);
    let frag_info = args.buf::<Float4>(3);
    let mut color = args.buf::<Float4>(4);
    let buffer_size = args.buf::<u32>(5);
    let depth = args.buf::<i32>(6);
    let frag_size = args.buf::<u32>(7);

    let count = (n as usize).min(frag_size[0] as usize).min(frag_pos.len());
    for i in 0..count {
        let p = frag_pos[i];
        let info = frag_info[i];
        let coord = p.y as usize * buffer_size[0] as usize + p.x as usize;
        if depth[coord] != p.z.to_bits() as i32 {
            continue;
        }
        let base = info.w as usize * 3;
        let corner_normal = |j: usize| {
            let f = interp_normal[base + j];
            Vec3::new(f.x, f.y, f.z)
        };
        let corner_world = |j: usize| {
            let f = interp_world[base + j];
            Vec4::new(f.x, f.y, f.z, f.w)
        };
        let normal = (corner_normal(0) * info.x
            + corner_normal(1) * info.y
            + corner_normal(2) * info.z)
            .normalized();
        let world = (corner_world(0) * info.x
            + corner_world(1) * info.y
            + corner_world(2) * info.z)
            .dehomogenized();
        let light = (Vec4::point(-15.0, 30.0, 100.0) - world).xyz().normalized();
        let c = normal.dot(light);
        color[coord] = Float4::new(c * 255.0, c * 255.0, c * 255.0, 255.0);
    }
}

#[derive(Parser)]
#[command(about = "Render a Wavefront OBJ mesh to a PPM image")]
struct Args {
    /// Path to the triangle mesh (Wavefront OBJ).
    mesh: std::path::PathBuf,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Output image path.
    #[arg(long, default_value = "out.ppm")]
    output: std::path::PathBuf,

    /// Render on the host device even when a GPU is available.
    #[arg(long)]
    cpu: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = glint::logging::level_from_env() {
        builder.filter_level(level);
    }
    builder.init();

    let src = match std::fs::read_to_string(&args.mesh) {
        Ok(src) => src,
        Err(e) => {
            eprintln!("cannot read mesh '{}': {e}", args.mesh.display());
            return ExitCode::from(2);
        }
    };

    match draw(&args, &src) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn draw(args: &Args, src: &str) -> anyhow::Result<()> {
    let mesh = glint::mesh::parse_obj(src)?;
    let n = mesh.vertex_count();
    anyhow::ensure!(n > 0, "mesh has no faces");

    let kind = if args.cpu {
        DeviceKind::Cpu
    } else {
        DeviceKind::All
    };
    let ps = platforms();
    let ds = devices(&ps, kind);
    let device = ds.last().context("no compute devices available")?;
    log::info!("rendering {n} vertices on '{}'", device.name());

    let ctx = Context::new(device)?;
    let _scope = ContextGuard::new(&ctx)?;

    let options = CompileOptions::default().arg_info(true);
    let vert_prg = compile(VERTEX_SHADER, &options)?;
    vert_prg.register_cpu_kernel("vertex_shader", vertex_shader_cpu)?;
    let frag_prg = compile(FRAGMENT_SHADER, &options)?;
    frag_prg.register_cpu_kernel("fragment_shader", fragment_shader_cpu)?;

    let rp = Rasterizer::new(args.width, args.height)?;
    rp.set_vertex_count(n);
    rp.set_vertex_shader_program(&vert_prg)?;
    rp.set_fragment_shader_program(&frag_prg)?;

    let attr_vertex = Buffer::from_values_in(&mesh.attr_vertex, StorageClass::HostMap);
    let attr_normal = Buffer::from_values_in(&mesh.attr_normal, StorageClass::HostMap);
    let interp_position: Buffer<Vec4> = Buffer::with_capacity(n);
    let interp_normal: Buffer<Vec3> = Buffer::with_capacity(n);
    let interp_world: Buffer<Vec4> = Buffer::with_capacity(n);

    let mvp = transform::perspective(
        std::f32::consts::FRAC_PI_4,
        args.width as f32 / args.height as f32,
        10.0,
        1000.0,
    ) * transform::translate(Vec4::point(0.0, 0.0, -mesh.max_extent() - 100.0))
        * transform::rotate(-std::f32::consts::FRAC_PI_6, transform::Plane::YOZ);
    let rows: Vec<Vec4> = (0..4).map(|i| mvp.row(i)).collect();
    let uniform_matrix = Buffer::from_values_in(&rows, StorageClass::HostMap);

    rp.bind_buffer("AttributeVertex", &attr_vertex);
    rp.bind_buffer("AttributeNormal", &attr_normal);
    rp.bind_buffer("InterpPosition", &interp_position);
    rp.bind_buffer("InterpNormal", &interp_normal);
    rp.bind_buffer("InterpPositionWorld", &interp_world);
    rp.bind_buffer("UniformMatrix", &uniform_matrix);

    glint::Promise::new()?
        .then(glint::push(&attr_vertex))?
        .then(glint::push(&attr_normal))?
        .then(glint::wait())?;

    rp.render()?;

    let pixels = rp.pixel_buffer().to_vec();
    glint::image::write_ppm(&args.output, args.width, args.height, &pixels)
        .with_context(|| format!("writing {}", args.output.display()))?;
    log::info!("wrote {}", args.output.display());
    Ok(())
}
