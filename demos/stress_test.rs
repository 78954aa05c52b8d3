#![cfg(feature = "stress")]

// demos/stress_test.rs
//
// Drives run_stress_iteration() over synthetic images in a loop, for
// manual soak testing (leak checking under valgrind/ASan, long-run
// stability) outside of the fuzzer's single-iteration model.

use snapcompress::engine::stress::run_stress_iteration;

fn synthetic_image(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::ImageBuffer::from_fn(
        width,
        height,
        |x, y| image::Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255]),
    ));
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("encode synthetic PNG");
    buf
}

fn iterations_from_args() -> usize {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--iterations" || arg == "-n" {
            if let Some(value) = args.next() {
                if let Ok(parsed) = value.parse::<usize>() {
                    return parsed;
                }
            }
        } else if let Ok(parsed) = arg.parse::<usize>() {
            return parsed;
        }
    }
    200
}

fn run_or_fail(label: &str, iteration: usize, data: &[u8]) {
    if let Err(err) = run_stress_iteration(data) {
        panic!("{label} stress iteration {iteration} failed: {err}");
    }
}

fn main() {
    let iterations = iterations_from_args();
    let small = synthetic_image(16, 16);
    let square = synthetic_image(256, 256);
    let wide = synthetic_image(1024, 768);
    let tall = synthetic_image(64, 4096);

    for i in 0..iterations {
        run_or_fail("small", i, &small);
        run_or_fail("square", i, &square);
        run_or_fail("wide", i, &wide);
        run_or_fail("tall", i, &tall);

        if i % 25 == 0 {
            eprintln!("stress iteration {i} completed");
        }
    }
}
