//! Detection.xml generation and parsing.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::models::detection::{DetectionMetadata, EncryptionInfo};
use crate::models::error::{PackageError, PackageResult};
use crate::models::msi::MsiInfo;

/// Tool version to include in Detection.xml (matches Microsoft's format).
const TOOL_VERSION: &str = "1.8.6.0";

/// Generate Detection.xml content matching the Microsoft format.
///
/// The XML format matches the original Microsoft Win32 Content Prep Tool:
/// - No XML declaration
/// - ToolVersion attribute on root element
/// - 2-space indentation with CRLF line endings (Windows style)
/// - Fixed element order; Intune rejects reordered descriptors
pub fn generate_detection_xml(metadata: &DetectionMetadata) -> PackageResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    // ApplicationInfo root element with namespaces and ToolVersion
    let mut root = BytesStart::new("ApplicationInfo");
    root.push_attribute(("xmlns:xsd", "http://www.w3.org/2001/XMLSchema"));
    root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
    root.push_attribute(("ToolVersion", TOOL_VERSION));
    writer
        .write_event(Event::Start(root))
        .map_err(|e| PackageError::XmlError {
            reason: e.to_string(),
        })?;

    write_element(&mut writer, "Name", &metadata.name)?;
    write_element(
        &mut writer,
        "UnencryptedContentSize",
        &metadata.unencrypted_content_size.to_string(),
    )?;
    write_element(&mut writer, "FileName", &metadata.file_name)?;
    write_element(&mut writer, "SetupFile", &metadata.setup_file)?;

    // EncryptionInfo element
    writer
        .write_event(Event::Start(BytesStart::new("EncryptionInfo")))
        .map_err(|e| PackageError::XmlError {
            reason: e.to_string(),
        })?;

    let info = &metadata.encryption_info;

    write_element(&mut writer, "EncryptionKey", &info.encryption_key_base64())?;
    write_element(&mut writer, "MacKey", &info.mac_key_base64())?;
    write_element(&mut writer, "InitializationVector", &info.iv_base64())?;
    write_element(&mut writer, "Mac", &info.mac_base64())?;
    write_element(&mut writer, "ProfileIdentifier", &info.profile_identifier)?;
    write_element(&mut writer, "FileDigest", &info.file_digest_base64())?;
    write_element(
        &mut writer,
        "FileDigestAlgorithm",
        &info.file_digest_algorithm,
    )?;

    writer
        .write_event(Event::End(BytesEnd::new("EncryptionInfo")))
        .map_err(|e| PackageError::XmlError {
            reason: e.to_string(),
        })?;

    // MsiInfo block, only when the extractor produced something
    if let Some(msi) = metadata.msi_info.as_ref().filter(|m| !m.is_empty()) {
        write_msi_info(&mut writer, msi)?;
    }

    // Close ApplicationInfo
    writer
        .write_event(Event::End(BytesEnd::new("ApplicationInfo")))
        .map_err(|e| PackageError::XmlError {
            reason: e.to_string(),
        })?;

    let output = writer.into_inner();
    let xml = String::from_utf8(output).map_err(|e| PackageError::XmlError {
        reason: e.to_string(),
    })?;

    // Convert LF to CRLF for Windows compatibility (Microsoft tool uses CRLF)
    Ok(xml.replace('\n', "\r\n"))
}

/// Write the MsiInfo element with the fixed defaults Intune expects.
///
/// Empty string properties are omitted, matching IntuneWinAppUtil; the
/// boolean install attributes are constants for per-machine MSI installs.
fn write_msi_info<W: std::io::Write>(
    writer: &mut Writer<W>,
    msi: &MsiInfo,
) -> PackageResult<()> {
    writer
        .write_event(Event::Start(BytesStart::new("MsiInfo")))
        .map_err(|e| PackageError::XmlError {
            reason: e.to_string(),
        })?;

    write_element_skip_empty(writer, "MsiProductCode", &msi.product_code)?;
    write_element_skip_empty(writer, "MsiProductVersion", &msi.product_version)?;
    write_element_skip_empty(writer, "MsiPackageCode", &msi.package_code)?;
    write_element_skip_empty(writer, "MsiUpgradeCode", &msi.upgrade_code)?;
    write_element(writer, "MsiExecutionContext", "Any")?;
    write_element(writer, "MsiRequiresLogon", "false")?;
    write_element(writer, "MsiRequiresReboot", "false")?;
    write_element(writer, "MsiIsMachineInstall", "true")?;
    write_element(writer, "MsiIsUserInstall", "false")?;
    write_element(writer, "MsiIncludesServices", "false")?;
    write_element(writer, "MsiIncludesODBCDataSource", "false")?;
    write_element(writer, "MsiContainsSystemRegistryKeys", "false")?;
    write_element(writer, "MsiContainsSystemFolders", "false")?;
    write_element_skip_empty(writer, "MsiPublisher", &msi.publisher)?;

    writer
        .write_event(Event::End(BytesEnd::new("MsiInfo")))
        .map_err(|e| PackageError::XmlError {
            reason: e.to_string(),
        })?;

    Ok(())
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> PackageResult<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(|e| PackageError::XmlError {
            reason: e.to_string(),
        })?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(|e| PackageError::XmlError {
            reason: e.to_string(),
        })?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| PackageError::XmlError {
            reason: e.to_string(),
        })?;
    Ok(())
}

fn write_element_skip_empty<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> PackageResult<()> {
    if value.is_empty() {
        return Ok(());
    }
    write_element(writer, name, value)
}

/// Parse Detection.xml content into DetectionMetadata.
///
/// Used by the verification unpack path; the MsiInfo block is not needed to
/// recover the content and is skipped.
pub fn parse_detection_xml(xml: &str) -> PackageResult<DetectionMetadata> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut name = String::new();
    let mut unencrypted_content_size: u64 = 0;
    let mut file_name = String::new();
    let mut setup_file = String::new();
    let mut encryption_info = EncryptionInfo::new();

    let mut current_element = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current_element = String::from_utf8_lossy(e.name().as_ref()).to_string();
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| PackageError::XmlError {
                    reason: format!("Failed to unescape text: {}", err),
                })?;

                match current_element.as_str() {
                    "Name" => name = text.to_string(),
                    "UnencryptedContentSize" => {
                        unencrypted_content_size =
                            text.parse().map_err(|e| PackageError::XmlError {
                                reason: format!("Invalid UnencryptedContentSize: {}", e),
                            })?;
                    }
                    "FileName" => file_name = text.to_string(),
                    "SetupFile" => setup_file = text.to_string(),
                    "EncryptionKey" => {
                        encryption_info
                            .set_encryption_key_from_base64(&text)
                            .map_err(|e| PackageError::XmlError { reason: e })?;
                    }
                    "MacKey" => {
                        encryption_info
                            .set_mac_key_from_base64(&text)
                            .map_err(|e| PackageError::XmlError { reason: e })?;
                    }
                    "InitializationVector" => {
                        encryption_info
                            .set_iv_from_base64(&text)
                            .map_err(|e| PackageError::XmlError { reason: e })?;
                    }
                    "Mac" => {
                        encryption_info
                            .set_mac_from_base64(&text)
                            .map_err(|e| PackageError::XmlError { reason: e })?;
                    }
                    "ProfileIdentifier" => {
                        encryption_info.profile_identifier = text.to_string();
                    }
                    "FileDigest" => {
                        encryption_info
                            .set_file_digest_from_base64(&text)
                            .map_err(|e| PackageError::XmlError { reason: e })?;
                    }
                    "FileDigestAlgorithm" => {
                        encryption_info.file_digest_algorithm = text.to_string();
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                current_element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PackageError::XmlError {
                    reason: format!("XML parse error: {}", e),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    // Validate required fields
    if name.is_empty() {
        return Err(PackageError::XmlError {
            reason: "Missing Name element".to_string(),
        });
    }
    if setup_file.is_empty() {
        return Err(PackageError::XmlError {
            reason: "Missing SetupFile element".to_string(),
        });
    }

    Ok(DetectionMetadata {
        name,
        unencrypted_content_size,
        file_name,
        setup_file,
        encryption_info,
        msi_info: None,
    })
}
