use std::fs;
use std::process::{Command, Output};

use tempfile::TempDir;

const TINT_SHADER: &str = "uniform float time;
uniform float2 resolution;
layout(color) uniform float4 tint;
uniform shader content;

half4 main(float2 coord) {
    return content.eval(coord) * tint;
}
";

fn shaderfx(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shaderfx"))
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run shaderfx")
}

fn write_gradient_scene(dir: &TempDir, uniforms: &str) -> String {
    let scene = dir.path().join("scene.toml");
    fs::write(
        &scene,
        format!(
            "version = 1\nwidth = 32\nheight = 16\n\n[[layers]]\nname = \"bg\"\nsample = \"gradient\"\ncontent = \"none\"\ncomposite = \"replace\"\n[layers.uniforms]\n{uniforms}"
        ),
    )
    .unwrap();
    scene.to_string_lossy().into_owned()
}

#[test]
fn inspect_lists_declared_uniforms() {
    let dir = TempDir::new().unwrap();
    let shader = dir.path().join("tint.sksl");
    fs::write(&shader, TINT_SHADER).unwrap();

    let output = shaderfx(&["inspect", shader.to_str().unwrap()]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("time"));
    assert!(stdout.contains("layout(color)"));
    assert!(stdout.contains("Caller supplies: tint"));
}

#[test]
fn render_writes_a_png_of_the_requested_size() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("nested/gradient.png");

    let output = shaderfx(&[
        "render",
        "--sample",
        "gradient",
        "--runtime",
        "software",
        "--size",
        "40x20",
        "-o",
        target.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let frame = image::open(&target).unwrap().to_rgba8();
    assert_eq!(frame.dimensions(), (40, 20));
    assert_eq!(frame.get_pixel(0, 0).0[3], 255);
}

#[test]
fn animate_writes_one_file_per_frame() {
    let dir = TempDir::new().unwrap();
    let frames = dir.path().join("frames");

    let output = shaderfx(&[
        "animate",
        "--sample",
        "blue-web",
        "--runtime",
        "software",
        "--size",
        "24x12",
        "--frames",
        "3",
        "-o",
        frames.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    for index in 0..3 {
        assert!(frames.join(format!("frame_{index:05}.png")).exists());
    }
    assert!(!frames.join("frame_00003.png").exists());
}

#[test]
fn unsupported_effects_paint_content_undecorated() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("tint.sksl"), TINT_SHADER).unwrap();
    let scene = dir.path().join("scene.toml");
    fs::write(
        &scene,
        "version = 1\nwidth = 16\nheight = 8\n\n[[layers]]\nname = \"tinted\"\nshader = \"tint.sksl\"\ncontent = \"fill\"\ncolor = \"#ff0000\"\n[layers.uniforms]\ntint = \"#00ff00\"\n",
    )
    .unwrap();
    let target = dir.path().join("out.png");

    let output = shaderfx(&[
        "render",
        "--scene",
        scene.to_str().unwrap(),
        "--runtime",
        "software",
        "-o",
        target.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let frame = image::open(&target).unwrap().to_rgba8();
    assert_eq!(frame.get_pixel(3, 3).0, [255, 0, 0, 255]);
}

#[test]
fn missing_caller_uniforms_fail_the_run() {
    let dir = TempDir::new().unwrap();
    let scene = write_gradient_scene(&dir, "tl = \"#000000\"\n");
    let target = dir.path().join("out.png");

    let output = shaderfx(&[
        "render",
        "--scene",
        &scene,
        "--runtime",
        "software",
        "-o",
        target.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(!target.exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("br"));
}

#[test]
fn complete_scene_files_render() {
    let dir = TempDir::new().unwrap();
    let scene = write_gradient_scene(&dir, "tl = \"#000000\"\nbr = \"#ffffff\"\n");
    let target = dir.path().join("out.png");

    let output = shaderfx(&[
        "render",
        "--scene",
        &scene,
        "--runtime",
        "software",
        "-o",
        target.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(target.exists());
}

#[test]
fn unrepresentable_frame_rates_fall_back_to_sixty() {
    let dir = TempDir::new().unwrap();
    let frames = dir.path().join("frames");

    let output = shaderfx(&[
        "animate",
        "--sample",
        "gradient",
        "--runtime",
        "software",
        "--size",
        "8x4",
        "--fps",
        "1e-39",
        "--frames",
        "2",
        "-o",
        frames.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(frames.join("frame_00001.png").exists());
}
