//! End-to-end packaging scenarios.

use std::collections::BTreeSet;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use tempfile::TempDir;
use zip::read::ZipArchive;

use intunepack::packager::{self, package, unpack_package};
use intunepack::{PackageRequest, Verbosity};

fn quiet_request(source: &Path, setup: &str, output: &Path) -> PackageRequest {
    PackageRequest::new(source.to_path_buf(), setup.to_string(), output.to_path_buf())
        .with_verbosity(Verbosity::Quiet)
}

#[test]
fn minimal_exe_package() {
    let source = TempDir::new().unwrap();
    fs::write(
        source.path().join("setup.exe"),
        b"fake installer content for testing",
    )
    .unwrap();
    let output = TempDir::new().unwrap();

    let outcome = package(&quiet_request(source.path(), "setup.exe", output.path())).unwrap();

    let expected_path = output.path().join("setup.intunewin");
    assert_eq!(outcome.output_path, expected_path);
    assert!(expected_path.exists());
    assert_eq!(outcome.file_count, 1);

    // Outer archive: exactly the two fixed Store entries
    let bytes = fs::read(&expected_path).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(&bytes)).unwrap();
    assert_eq!(archive.len(), 2);

    let names: BTreeSet<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    let expected: BTreeSet<String> = [
        "IntuneWinPackage/Contents/IntunePackage.intunewin",
        "IntuneWinPackage/Metadata/Detection.xml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    assert_eq!(names, expected);

    for i in 0..archive.len() {
        let entry = archive.by_index(i).unwrap();
        assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
    }

    // Descriptor contents
    let mut xml = String::new();
    archive
        .by_name("IntuneWinPackage/Metadata/Detection.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();

    assert!(xml.contains("ToolVersion=\"1.8.6.0\""));
    assert!(xml.contains("<Name>setup</Name>"));
    assert!(xml.contains("<SetupFile>setup.exe</SetupFile>"));
    assert!(xml.contains("<FileName>IntunePackage.intunewin</FileName>"));
    assert!(xml.contains("<ProfileIdentifier>ProfileVersion1</ProfileIdentifier>"));
    assert!(xml.contains("<FileDigestAlgorithm>SHA256</FileDigestAlgorithm>"));
    assert!(!xml.contains("<MsiInfo>"));
    assert!(xml.contains("\r\n"));
}

#[test]
fn missing_setup_file_creates_nothing() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("other.txt"), b"not a setup file").unwrap();
    let output = TempDir::new().unwrap();

    let result = package(&quiet_request(source.path(), "setup.exe", output.path()));
    assert!(result.is_err());

    let leftovers: Vec<_> = fs::read_dir(output.path()).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[test]
fn subdirectory_tree_round_trips() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("setup.exe"), b"installer bytes").unwrap();
    fs::create_dir_all(source.path().join("data/config")).unwrap();
    fs::write(
        source.path().join("data/config/settings.json"),
        b"{\"mode\":\"silent\"}",
    )
    .unwrap();
    let output = TempDir::new().unwrap();

    let outcome = package(&quiet_request(source.path(), "setup.exe", output.path())).unwrap();
    assert!(outcome.file_count >= 2);
    assert_eq!(outcome.source_size, 15 + 17);

    // Decrypt with the keys carried in the descriptor and verify the inner
    // ZIP holds both files at their forward-slash paths.
    let extracted = TempDir::new().unwrap();
    let unpacked = unpack_package(&outcome.output_path, extracted.path()).unwrap();

    assert_eq!(unpacked.setup_file, "setup.exe");
    assert_eq!(unpacked.file_count, 2);
    assert_eq!(
        fs::read(extracted.path().join("setup.exe")).unwrap(),
        b"installer bytes"
    );
    assert_eq!(
        fs::read(extracted.path().join("data/config/settings.json")).unwrap(),
        b"{\"mode\":\"silent\"}"
    );
}

#[test]
fn inner_zip_uses_deflate_and_forward_slashes() {
    use intunepack::packager::encrypt::decrypt_content;
    use intunepack::packager::metadata::parse_detection_xml;

    let source = TempDir::new().unwrap();
    fs::write(source.path().join("setup.exe"), b"installer").unwrap();
    fs::create_dir_all(source.path().join("sub")).unwrap();
    fs::write(source.path().join("sub/file.dat"), vec![0x55u8; 2048]).unwrap();
    let output = TempDir::new().unwrap();

    let outcome = package(&quiet_request(source.path(), "setup.exe", output.path())).unwrap();

    let bytes = fs::read(&outcome.output_path).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(&bytes)).unwrap();

    let mut xml = String::new();
    archive
        .by_name("IntuneWinPackage/Metadata/Detection.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    let detection = parse_detection_xml(&xml).unwrap();

    let mut encrypted = Vec::new();
    archive
        .by_name("IntuneWinPackage/Contents/IntunePackage.intunewin")
        .unwrap()
        .read_to_end(&mut encrypted)
        .unwrap();

    let inner = decrypt_content(&encrypted, &detection.encryption_info).unwrap();
    assert_eq!(inner.len() as u64, detection.unencrypted_content_size);

    let mut inner_zip = ZipArchive::new(Cursor::new(&inner)).unwrap();
    let file = inner_zip.by_name("sub/file.dat").unwrap();
    assert_eq!(file.compression(), zip::CompressionMethod::Deflated);
}

#[test]
fn block_aligned_plaintext_gains_full_padding_block() {
    use intunepack::packager::encrypt::{create_encryption_info, pkcs7_pad};

    let plaintext = [0xA5u8; 16];
    let (_, encrypted) = create_encryption_info(&plaintext).unwrap();

    // mac(32) + iv(16) + two blocks of ciphertext
    assert_eq!(encrypted.len(), 48 + 32);
    assert_eq!(pkcs7_pad(&plaintext, 16).len(), 32);
}

#[test]
fn tampered_blob_fails_before_decryption() {
    use intunepack::PackageError;
    use intunepack::packager::encrypt::{create_encryption_info, decrypt_content};

    let (info, mut encrypted) = create_encryption_info(b"sensitive plaintext").unwrap();

    // Bit 0 of byte 32 is the first IV bit
    encrypted[32] ^= 0x01;

    assert!(matches!(
        decrypt_content(&encrypted, &info),
        Err(PackageError::HmacVerificationFailed)
    ));
}

#[test]
fn msi_extraction_from_crafted_compound_file() {
    use intunepack::packager::msi::extract_msi_info;

    let source = TempDir::new().unwrap();
    let msi_path = source.path().join("test.msi");
    write_crafted_msi(&msi_path);

    let info = extract_msi_info(&msi_path).unwrap();

    assert_eq!(info.product_code, "{12345678-1234-1234-1234-123456789ABC}");
    assert_eq!(info.product_version, "8.8.8");
    assert_eq!(info.upgrade_code, "{87654321-4321-4321-4321-CBA987654321}");
    assert_eq!(info.publisher, "Acme Corp");
}

#[test]
fn msi_package_carries_msi_info_block() {
    let source = TempDir::new().unwrap();
    write_crafted_msi(&source.path().join("test.msi"));
    let output = TempDir::new().unwrap();

    let outcome = package(&quiet_request(source.path(), "test.msi", output.path())).unwrap();
    assert_eq!(outcome.output_path, output.path().join("test.intunewin"));

    let bytes = fs::read(&outcome.output_path).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(&bytes)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("IntuneWinPackage/Metadata/Detection.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();

    assert!(xml.contains("<MsiInfo>"));
    assert!(xml.contains(
        "<MsiProductCode>{12345678-1234-1234-1234-123456789ABC}</MsiProductCode>"
    ));
    assert!(xml.contains("<MsiProductVersion>8.8.8</MsiProductVersion>"));
    assert!(xml.contains("<MsiPublisher>Acme Corp</MsiPublisher>"));
    assert!(xml.contains("<MsiExecutionContext>Any</MsiExecutionContext>"));
}

#[test]
fn non_cfb_msi_is_a_warning_not_a_failure() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("broken.msi"), b"this is not a compound file").unwrap();
    let output = TempDir::new().unwrap();

    let outcome = package(&quiet_request(source.path(), "broken.msi", output.path())).unwrap();
    assert!(outcome.output_path.exists());

    let bytes = fs::read(&outcome.output_path).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(&bytes)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("IntuneWinPackage/Metadata/Detection.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();

    assert!(!xml.contains("<MsiInfo>"));
    assert!(xml.contains("<Name>broken</Name>"));
}

#[test]
fn unencrypted_content_size_matches_digest_source() {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use intunepack::packager::encrypt::{decrypt_content, file_digest};
    use intunepack::packager::metadata::parse_detection_xml;

    let source = TempDir::new().unwrap();
    fs::write(source.path().join("setup.exe"), b"digest check").unwrap();
    let output = TempDir::new().unwrap();

    let outcome = package(&quiet_request(source.path(), "setup.exe", output.path())).unwrap();

    let bytes = fs::read(&outcome.output_path).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(&bytes)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("IntuneWinPackage/Metadata/Detection.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    let detection = parse_detection_xml(&xml).unwrap();

    let mut encrypted = Vec::new();
    archive
        .by_name("IntuneWinPackage/Contents/IntunePackage.intunewin")
        .unwrap()
        .read_to_end(&mut encrypted)
        .unwrap();

    let inner = decrypt_content(&encrypted, &detection.encryption_info).unwrap();

    // FileDigest is the SHA256 of the plaintext ZIP
    assert_eq!(
        BASE64.encode(file_digest(&inner)),
        xml.split("<FileDigest>")
            .nth(1)
            .unwrap()
            .split("</FileDigest>")
            .next()
            .unwrap()
    );
    assert_eq!(outcome.zip_size, inner.len() as u64);
}

#[test]
fn format_size_uses_binary_prefixes() {
    assert_eq!(packager::format_size(999), "999 bytes");
    assert_eq!(packager::format_size(2048), "2.00 KB");
    assert_eq!(packager::format_size(3 * 1024 * 1024), "3.00 MB");
}

/// Build an MSI-shaped compound file whose raw bytes carry a Property-table
/// style concatenated run.
fn write_crafted_msi(path: &Path) {
    let cursor = Cursor::new(Vec::new());
    let mut comp = cfb::CompoundFile::create(cursor).unwrap();
    {
        let mut stream = comp.create_stream("PropertyData").unwrap();
        stream
            .write_all(
                b"ProductCode{12345678-1234-1234-1234-123456789ABC}\
                  ProductVersion8.8.8\
                  UpgradeCode{87654321-4321-4321-4321-CBA987654321}\
                  ManufacturerAcme Corp",
            )
            .unwrap();
        stream.flush().unwrap();
    }
    comp.flush().unwrap();
    let bytes = comp.into_inner().into_inner();
    fs::write(path, bytes).unwrap();
}
