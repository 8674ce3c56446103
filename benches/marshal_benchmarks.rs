//! 编组与设备调用性能基准测试
//!
//! 测试像素矩阵与事件的脚本值编组，以及经由模拟运行时的整屏写入

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sense_hat_bridge::device::{
    FromScriptValue, JoystickAction, JoystickDirection, JoystickEvent, PixelColor, PixelMatrix,
    SenseHat, ToScriptValue,
};
use sense_hat_bridge::scripting::{RuntimeContext, SimulatedRuntime};
use std::hint::black_box;
use std::sync::Arc;

fn gradient() -> PixelMatrix {
    let mut matrix = PixelMatrix::default();
    for (i, pixel) in matrix.pixels_mut().iter_mut().enumerate() {
        let i = i as i32;
        *pixel = PixelColor::new(i * 4, 255 - i * 4, i);
    }
    matrix
}

fn bench_matrix_marshalling(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix_marshalling");
    let matrix = gradient();
    let encoded = matrix.to_script_value().unwrap();

    group.bench_function("encode", |b| {
        b.iter(|| black_box(matrix.to_script_value().unwrap()));
    });

    group.bench_function("decode", |b| {
        b.iter(|| black_box(PixelMatrix::from_script_value(&encoded).unwrap()));
    });

    group.bench_function("quantize", |b| {
        b.iter(|| black_box(matrix.quantized()));
    });

    group.finish();
}

fn bench_event_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_decoding");

    for count in [1usize, 16, 256] {
        let events: Vec<_> = (0..count)
            .map(|i| {
                JoystickEvent::new(i as f64, JoystickDirection::Up, JoystickAction::Pressed)
                    .to_script_value()
                    .unwrap()
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &events, |b, events| {
            b.iter(|| {
                let decoded: Vec<JoystickEvent> = events
                    .iter()
                    .map(|event| JoystickEvent::from_script_value(event).unwrap())
                    .collect();
                black_box(decoded)
            });
        });
    }

    group.finish();
}

fn bench_simulated_device(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulated_device");
    let context = Arc::new(RuntimeContext::new(SimulatedRuntime::new()));
    let hat = SenseHat::open(context).unwrap();
    let matrix = gradient();

    group.bench_function("set_pixels", |b| {
        b.iter(|| hat.set_pixels(Some(black_box(&matrix))).unwrap());
    });

    group.bench_function("get_pixel", |b| {
        b.iter(|| black_box(hat.get_pixel(3, 4).unwrap()));
    });

    group.finish();
    hat.close().unwrap();
}

criterion_group!(
    benches,
    bench_matrix_marshalling,
    bench_event_decoding,
    bench_simulated_device
);
criterion_main!(benches);
