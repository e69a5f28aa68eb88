//! Integration test: decode an image, run the pipeline and write every stage to disk.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use lumen_io::{DEFAULT_FILE_NAME, decode, encode_png, write_result};
use lumen_pipeline::{PipelineConfig, PixelBuffer, Stage, StageConfig, process};

#[allow(clippy::cast_possible_truncation)]
fn split_image() -> PixelBuffer {
    PixelBuffer::from_fn(16, 12, |x, y| {
        if x < 8 {
            [20, 40, 60, 255]
        } else {
            [220, (y * 10) as u8, 90, 255]
        }
    })
}

#[test]
fn decode_process_and_write_all_stages() {
    let png = encode_png(&split_image()).unwrap();
    let buffer = decode(&png).unwrap();
    let result = process(buffer, &PipelineConfig::default()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let written = write_result(dir.path(), &result).unwrap();

    let names: Vec<_> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["grayscale.png", "enhanced.png", "filtered.png", DEFAULT_FILE_NAME]
    );

    let final_bytes = std::fs::read(dir.path().join(DEFAULT_FILE_NAME)).unwrap();
    assert_eq!(decode(&final_bytes).unwrap(), result.output);

    let gray_bytes = std::fs::read(dir.path().join("grayscale.png")).unwrap();
    assert_eq!(
        decode(&gray_bytes).unwrap(),
        result.snapshots.grayscale.unwrap()
    );
}

#[test]
fn disabled_stages_write_only_final_image() {
    let config = PipelineConfig {
        stages: StageConfig::none().with(Stage::EdgeDetection, true),
        ..PipelineConfig::default()
    };
    let result = process(split_image(), &config).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("out/run-1");
    let written = write_result(&nested, &result).unwrap();
    assert_eq!(written, vec![nested.join(DEFAULT_FILE_NAME)]);
    assert!(nested.join(DEFAULT_FILE_NAME).exists());
    assert!(!nested.join("grayscale.png").exists());
}
