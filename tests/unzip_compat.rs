use lazy_zip::{CompressionMethod, EntryOptions, EntrySource, Zipper};
use std::fs::File;
use std::process::Command;
use tempfile::tempdir;

// This test writes a ZIP using the library and then calls `unzip -t` to verify compatibility.
// If `unzip` is not present on the system, the test will be skipped.

#[test]
fn unzip_compatibility() {
    // Check if `unzip` exists by trying to run `unzip -v`.
    let check = Command::new("unzip").arg("-v").output();
    if check.is_err() {
        eprintln!("skipping test: `unzip` not found");
        return;
    }

    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("compat.zip");
    let on_disk = dir.path().join("on-disk.txt");
    std::fs::write(&on_disk, b"read lazily from disk").unwrap();

    // Create zip
    {
        let mut zipper = Zipper::new();
        zipper.add_entry("hello.txt", "hello from test").unwrap();
        zipper
            .add_entry_with(
                "stored/plain.txt",
                "kept as is",
                EntryOptions::new().method(CompressionMethod::Stored),
            )
            .unwrap();
        zipper.add_file("on-disk.txt", &on_disk).unwrap();
        zipper.start_entry("big.bin").unwrap();
        // write a moderate amount of data to ensure non-trivial archive
        for _ in 0..1024 {
            zipper.write_data(&[0u8; 1024]).unwrap();
        }
        zipper
            .add_entries((0..3).map(|i| (format!("lazy/{i}.txt"), EntrySource::bytes(vec![b'q'; i * 100]))))
            .unwrap();
        zipper.finish().unwrap();

        let mut out = File::create(&zip_path).unwrap();
        zipper.write_to(&mut out).unwrap();
    }

    // Run `unzip -t` to test archive integrity
    let output = Command::new("unzip")
        .arg("-t")
        .arg(&zip_path)
        .output()
        .expect("failed to run unzip");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "unzip reported failure: {} {}",
        stdout,
        stderr
    );
    assert!(stdout.contains("lazy/2.txt"), "missing entry in: {}", stdout);
}
