mod common;

use std::fs;
use std::io::Write;

use approx::assert_abs_diff_eq;

use common::{layer_with_science, spike_image, uniform_image};
use driftscan_core::consts::NO_DATA;
use driftscan_core::image::pixel_has_data;
use driftscan_core::io::stack_io::{write_stack, StackReader, STACK_MAGIC};
use driftscan_core::stack::ImageStack;

fn sample_stack() -> ImageStack {
    let mut first = spike_image(12, 16, 5, 7, 9.5);
    first.data[[2, 3]] = NO_DATA;
    let mut images = vec![layer_with_science(first, 2.0, 60000.0, 1.0)];
    images.push(layer_with_science(
        uniform_image(12, 16, 0.25),
        2.0,
        60000.25,
        1.5,
    ));
    ImageStack::new(images).unwrap()
}

#[test]
fn test_container_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.dstk");

    let stack = sample_stack();
    write_stack(&path, &stack).unwrap();

    let reader = StackReader::open(&path).unwrap();
    assert_eq!(reader.header.num_images, 2);
    assert_eq!(reader.header.width, 16);
    assert_eq!(reader.header.height, 12);

    let loaded = reader.read_stack().unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.width(), 16);
    assert_abs_diff_eq!(loaded.get(0).unwrap().mjd(), 60000.0);
    assert_abs_diff_eq!(loaded.get(1).unwrap().mjd(), 60000.25);

    // Science pixels round-trip bitwise, including the NO_DATA sentinel.
    let science = loaded.get(0).unwrap().science();
    assert_abs_diff_eq!(science.data[[5, 7]], 9.5);
    assert!(!pixel_has_data(science.data[[2, 3]]));

    // PSF kernels survive as explicit kernels of the same radius.
    assert_eq!(loaded.get(0).unwrap().psf().radius(), 3);
    assert_eq!(loaded.get(1).unwrap().psf().radius(), 5);
    let original = stack.get(1).unwrap().psf().kernel();
    let restored = loaded.get(1).unwrap().psf().kernel();
    for (a, b) in original.iter().zip(restored.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-7);
    }

    // Zeroed times derive identically from the restored timestamps.
    let times = loaded.zeroed_times();
    assert_abs_diff_eq!(times[1], 0.25, epsilon = 1e-6);
}

#[test]
fn test_bad_magic_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bogus.dstk");
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(b"NOPE").unwrap();
    file.write_all(&[0u8; 64]).unwrap();
    drop(file);

    assert!(StackReader::open(&path).is_err());
}

#[test]
fn test_truncated_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.dstk");
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(STACK_MAGIC).unwrap();
    drop(file);

    assert!(StackReader::open(&path).is_err());
}

#[test]
fn test_truncated_payload_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.dstk");
    write_stack(&path, &sample_stack()).unwrap();

    let bytes = fs::read(&path).unwrap();
    let cut = bytes.len() / 2;
    fs::write(&path, &bytes[..cut]).unwrap();

    let reader = StackReader::open(&path).unwrap();
    assert!(reader.read_stack().is_err());
}

#[test]
fn test_psi_generation_round_trips_through_container() {
    // A stack written and re-read produces the same search inputs.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.dstk");
    let stack = sample_stack();
    write_stack(&path, &stack).unwrap();
    let loaded = StackReader::open(&path).unwrap().read_stack().unwrap();

    let psi_a = stack.get(0).unwrap().generate_psi();
    let psi_b = loaded.get(0).unwrap().generate_psi();
    for (a, b) in psi_a.data.iter().zip(psi_b.data.iter()) {
        if pixel_has_data(*a) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        } else {
            assert!(!pixel_has_data(*b));
        }
    }
}
