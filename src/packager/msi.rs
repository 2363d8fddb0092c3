//! MSI metadata extraction.
//!
//! MSI files are OLE compound documents. The product identifiers live in the
//! Property table and the Summary Information stream, but the Property table
//! is serialized through MSI's string pool rather than as a flat stream, so
//! a full table reader is a large undertaking. Instead this module layers a
//! cascade of strategies per property:
//!
//! 1. Summary Information property set (PackageCode only).
//! 2. Direct byte-pattern scan for `Name<value>` runs in the raw file.
//! 3. String-pool decode and shape-based search.
//! 4. Nearest-neighbour scan around the property name.
//! 5. Any GUID at all (PackageCode fallback).
//!
//! Later layers admit false positives the earlier ones avoid, so the order
//! is load-bearing. Every candidate value passes the shape validators below
//! before it is accepted.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::models::error::{PackageError, PackageResult};
use crate::models::msi::MsiInfo;

const SUMMARY_INFORMATION_STREAM: &str = "\u{5}SummaryInformation";
const STRING_DATA_STREAM: &str = "!_StringData";

/// Property ID of the revision number (PackageCode) in Summary Information.
const PIDSI_REVNUMBER: u32 = 9;
const VT_LPSTR: u32 = 30;
const VT_LPWSTR: u32 = 31;

/// Property names that terminate a value in the concatenated Property-table
/// serialization ("ManufacturerAcme CorpProductCode{...}").
const BOUNDARY_PROPERTIES: &[&str] = &[
    "ProductCode",
    "ProductLanguage",
    "ProductName",
    "ProductVersion",
    "UpgradeCode",
    "SecureCustomProperties",
];

/// UI dialog fragments that disqualify a product-name candidate. The raw
/// scan can land inside the installer's UI tables; these substrings are the
/// wording observed to leak from them. Treat as data: extend when a new
/// installer leaks different dialog text.
const DIALOG_TEXT_FRAGMENTS: &[&str] = &[
    "setup wizard",
    "allows you",
    "the way",
    "change the",
    "is installed",
    "click next",
    "click back",
    "to continue",
    "will be installed",
    "installation",
    "completing the",
    "welcome to",
    "please wait",
];

/// The shape of value expected after a property name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Guid,
    Version,
    Name,
}

fn value_kind(property: &str) -> ValueKind {
    match property {
        "ProductCode" | "UpgradeCode" => ValueKind::Guid,
        "ProductVersion" => ValueKind::Version,
        _ => ValueKind::Name,
    }
}

/// Check if the given file name has an .msi extension.
pub fn is_msi_file(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".msi")
}

/// Extract metadata from an MSI file.
///
/// Fails only when the file cannot be opened or is not an OLE compound
/// document; individual properties the heuristics cannot recover are left
/// empty in the returned record.
pub fn extract_msi_info(msi_path: &Path) -> PackageResult<MsiInfo> {
    let file = fs::File::open(msi_path).map_err(|e| PackageError::MsiParseError {
        path: msi_path.to_path_buf(),
        reason: format!("failed to open MSI file: {}", e),
    })?;

    let mut doc = cfb::CompoundFile::open(file).map_err(|e| PackageError::MsiParseError {
        path: msi_path.to_path_buf(),
        reason: format!("not an OLE compound document: {}", e),
    })?;

    let stream_paths: Vec<(String, PathBuf)> = doc
        .walk()
        .filter(|entry| entry.is_stream())
        .map(|entry| (entry.name().to_string(), entry.path().to_path_buf()))
        .collect();

    let mut info = MsiInfo::default();
    let mut string_pool: Vec<String> = Vec::new();

    for (name, path) in &stream_paths {
        // Summary Information carries the PackageCode (PIDSI_REVNUMBER)
        if name == SUMMARY_INFORMATION_STREAM {
            if let Some(data) = read_stream(&mut doc, path) {
                info.package_code = summary_package_code(&data);
            }
        } else if name == STRING_DATA_STREAM {
            if let Some(data) = read_stream(&mut doc, path) {
                string_pool = decode_string_pool(&data);
            }
        }
    }
    drop(doc);

    let raw = fs::read(msi_path).map_err(|e| PackageError::MsiParseError {
        path: msi_path.to_path_buf(),
        reason: format!("failed to read MSI file: {}", e),
    })?;

    // Direct pattern match in the raw bytes first; it is the most reliable
    // source because MSI concatenates Property-table keys and values.
    info.product_code = property_value(&raw, "ProductCode");
    info.product_version = property_value(&raw, "ProductVersion");
    info.publisher = property_value(&raw, "Manufacturer");
    info.upgrade_code = property_value(&raw, "UpgradeCode");
    info.product_name = property_value(&raw, "ProductName");

    if !string_pool.is_empty() {
        if info.product_code.is_empty() {
            info.product_code = pool_find(&string_pool, |s| is_valid_guid(s));
        }
        if info.product_version.is_empty() {
            info.product_version = pool_find(&string_pool, |s| is_valid_version(s));
        }
        if info.publisher.is_empty() {
            info.publisher = pool_publisher(&string_pool);
        }
        if info.upgrade_code.is_empty() {
            info.upgrade_code = pool_find(&string_pool, |s| {
                is_valid_guid(s) && s != info.product_code
            });
        }
    }

    if info.product_code.is_empty() {
        info.product_code = guid_near_property(&raw, "ProductCode");
    }
    if info.product_version.is_empty() {
        info.product_version = version_near_property(&raw, "ProductVersion");
    }
    if info.publisher.is_empty() {
        info.publisher = string_near_property(&raw, "Manufacturer");
    }
    if info.upgrade_code.is_empty() {
        info.upgrade_code = guid_near_property(&raw, "UpgradeCode");
    }

    if info.package_code.is_empty() {
        info.package_code = first_guid(&raw);
    }

    Ok(info)
}

fn read_stream<F: Read + std::io::Seek>(
    doc: &mut cfb::CompoundFile<F>,
    path: &Path,
) -> Option<Vec<u8>> {
    let mut stream = doc.open_stream(path).ok()?;
    let mut data = Vec::new();
    stream.read_to_end(&mut data).ok()?;
    Some(data)
}

// ---------------------------------------------------------------------------
// Layer 1: Summary Information property set
// ---------------------------------------------------------------------------

/// Recover the PackageCode from the Summary Information stream.
fn summary_package_code(data: &[u8]) -> String {
    if let Some(value) = property_set_revision(data) {
        if is_valid_guid(&value) {
            return value;
        }
        let guid = decompress_guid(&value);
        if !guid.is_empty() {
            return guid;
        }
    }

    // Fallback: any braced GUID in the stream, then a compressed one
    let guid = first_guid(data);
    if !guid.is_empty() {
        return guid;
    }
    find_compressed_guid(data)
}

/// Parse the OLE property set and return the PIDSI_REVNUMBER string.
///
/// Layout per MS-OLEPS: a 28-byte PropertySetStream header (byte order,
/// format version, OS version, CLSID, section count), then per section a
/// 16-byte FMTID + 32-bit offset. The section itself holds a size, a
/// property count, and (id, offset) pairs; offsets are section-relative.
fn property_set_revision(data: &[u8]) -> Option<String> {
    if u16_le(data, 0)? != 0xFFFE {
        return None;
    }
    if u32_le(data, 24)? == 0 {
        return None;
    }

    let section = u32_le(data, 44)? as usize;
    let property_count = u32_le(data, section.checked_add(4)?)? as usize;

    for i in 0..property_count.min(256) {
        let entry = section.checked_add(8 + i * 8)?;
        let property_id = u32_le(data, entry)?;
        let offset = u32_le(data, entry + 4)? as usize;

        if property_id != PIDSI_REVNUMBER {
            continue;
        }

        let value = section.checked_add(offset)?;
        let value_type = u32_le(data, value)? & 0xFFFF;
        return match value_type {
            VT_LPSTR => {
                let len = u32_le(data, value + 4)? as usize;
                let bytes = data.get(value + 8..(value + 8).checked_add(len)?)?;
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            VT_LPWSTR => {
                let chars = u32_le(data, value + 4)? as usize;
                let bytes = data.get(value + 8..(value + 8).checked_add(chars * 2)?)?;
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .take_while(|&u| u != 0)
                    .collect();
                Some(String::from_utf16_lossy(&units))
            }
            _ => None,
        };
    }

    None
}

fn u16_le(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn u32_le(data: &[u8], pos: usize) -> Option<u32> {
    let bytes = data.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

// ---------------------------------------------------------------------------
// GUID shapes
// ---------------------------------------------------------------------------

/// Check for the `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}` shape.
pub fn is_valid_guid(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 38 {
        return false;
    }
    if b[0] != b'{' || b[37] != b'}' {
        return false;
    }
    if b[9] != b'-' || b[14] != b'-' || b[19] != b'-' || b[24] != b'-' {
        return false;
    }

    b.iter().enumerate().all(|(i, &c)| {
        matches!(i, 0 | 9 | 14 | 19 | 24 | 37) || c.is_ascii_hexdigit()
    })
}

/// Convert MSI's compressed 32-hex-character GUID to the braced form.
///
/// Every group is stored with its byte pairs swapped: `12345678` reads back
/// as `21436587`. Returns an empty string when the input is not 32 hex
/// characters or the result fails the GUID shape.
pub fn decompress_guid(compressed: &str) -> String {
    let clean: String = compressed
        .chars()
        .filter(|c| !matches!(c, '{' | '}' | '-'))
        .collect();

    if clean.len() != 32 {
        return String::new();
    }
    let c = clean.as_bytes();

    let mut result = String::with_capacity(38);
    result.push('{');
    for group in [(0usize, 8usize), (8, 12), (12, 16), (16, 20), (20, 32)] {
        if group.0 != 0 {
            result.push('-');
        }
        let mut i = group.0;
        while i < group.1 {
            result.push(c[i + 1] as char);
            result.push(c[i] as char);
            i += 2;
        }
    }
    result.push('}');

    if is_valid_guid(&result) {
        result
    } else {
        String::new()
    }
}

/// Search raw bytes for a 32-character hex run that decompresses to a GUID.
fn find_compressed_guid(data: &[u8]) -> String {
    if data.len() < 32 {
        return String::new();
    }
    for i in 0..data.len() - 32 {
        if !data[i].is_ascii_hexdigit() {
            continue;
        }
        let window = &data[i..i + 32];
        if window.iter().all(|b| b.is_ascii_hexdigit()) {
            let guid = decompress_guid(std::str::from_utf8(window).unwrap_or(""));
            if !guid.is_empty() {
                return guid;
            }
        }
    }
    String::new()
}

/// Extract a braced GUID starting exactly at `pos`, or empty.
fn guid_at(data: &[u8], pos: usize) -> String {
    match data.get(pos..pos + 38).and_then(|w| std::str::from_utf8(w).ok()) {
        Some(candidate) if is_valid_guid(candidate) => candidate.to_string(),
        _ => String::new(),
    }
}

/// First valid braced GUID anywhere in the data.
fn first_guid(data: &[u8]) -> String {
    if data.len() < 38 {
        return String::new();
    }
    for i in 0..data.len() - 38 {
        if data[i] == b'{' {
            let guid = guid_at(data, i);
            if !guid.is_empty() {
                return guid;
            }
        }
    }
    String::new()
}

// ---------------------------------------------------------------------------
// Layer 2: direct property-name pattern scan
// ---------------------------------------------------------------------------

/// Extract a property value from the raw MSI bytes.
///
/// MSI serializes the Property table as contiguous key/value strings, e.g.
/// `ProductCode{GUID}ProductVersion1.0.0`. ASCII is tried first; UTF-16LE is
/// the fallback.
fn property_value(data: &[u8], property: &str) -> String {
    let ascii = property_value_ascii(data, property);
    if !ascii.is_empty() {
        return ascii;
    }
    property_value_utf16(data, property)
}

fn property_value_ascii(data: &[u8], property: &str) -> String {
    let pattern = property.as_bytes();
    let kind = value_kind(property);
    let mut from = 0usize;

    while let Some(pos) = find_bytes(data, pattern, from) {
        let value_start = pos + pattern.len();
        match kind {
            // The first occurrence decides for GUID-typed properties
            ValueKind::Guid => return guid_after(data, value_start),
            ValueKind::Version => {
                let version = version_at(data, value_start);
                if !version.is_empty() {
                    return version;
                }
            }
            ValueKind::Name => {
                let name = name_value_at(data, value_start);
                if !name.is_empty() {
                    return name;
                }
            }
        }
        from = pos + 1;
    }

    String::new()
}

fn property_value_utf16(data: &[u8], property: &str) -> String {
    let pattern = utf16le_bytes(property);
    let Some(pos) = find_bytes(data, &pattern, 0) else {
        return String::new();
    };
    let value_start = pos + pattern.len();

    match value_kind(property) {
        ValueKind::Guid => guid_after_utf16(data, value_start),
        ValueKind::Version => version_after_utf16(data, value_start, 64),
        ValueKind::Name => string_after_utf16(data, value_start),
    }
}

/// Find a braced GUID within the 64 bytes after `pos` (skips padding).
fn guid_after(data: &[u8], pos: usize) -> String {
    let end = (pos + 64).min(data.len());
    for i in pos..end {
        if data[i] == b'{' {
            let guid = guid_at(data, i);
            if !guid.is_empty() {
                return guid;
            }
        }
    }
    String::new()
}

/// Extract a version starting immediately at `pos`.
///
/// The value must begin with a digit; the scan stops at the first byte that
/// is neither a digit nor a dot, which is what terminates correctly at the
/// next property name (`8.8.8UpgradeCode...`). A trailing dot is trimmed.
fn version_at(data: &[u8], pos: usize) -> String {
    if pos >= data.len() || !data[pos].is_ascii_digit() {
        return String::new();
    }

    let end = (pos + 32).min(data.len());
    let len = data[pos..end]
        .iter()
        .take_while(|&&c| c.is_ascii_digit() || c == b'.')
        .count();

    let version = String::from_utf8_lossy(&data[pos..pos + len]);
    let version = version.trim_end_matches('.');
    if is_valid_version(version) {
        version.to_string()
    } else {
        String::new()
    }
}

/// Extract a manufacturer/product-name value starting at `pos`.
///
/// Consumes printable ASCII up to 256 bytes, stopping at the next known
/// property name or any non-printable byte.
fn name_value_at(data: &[u8], pos: usize) -> String {
    let end = (pos + 256).min(data.len());
    let mut result = Vec::new();

    let mut i = pos;
    'scan: while i < end {
        for boundary in BOUNDARY_PROPERTIES {
            let pattern = boundary.as_bytes();
            if data[i..].starts_with(pattern) {
                break 'scan;
            }
        }

        let c = data[i];
        if (0x20..0x7F).contains(&c) {
            result.push(c);
        } else {
            break;
        }
        i += 1;
    }

    let value = String::from_utf8_lossy(&result);
    let value = value.trim();
    if (2..=128).contains(&value.len())
        && !is_valid_guid(value)
        && !is_valid_version(value)
        && is_valid_product_name(value)
    {
        value.to_string()
    } else {
        String::new()
    }
}

// ---------------------------------------------------------------------------
// Layer 3: string pool
// ---------------------------------------------------------------------------

/// Decode the `!_StringData` stream as null-terminated UTF-16LE strings,
/// keeping printable code units only.
fn decode_string_pool(data: &[u8]) -> Vec<String> {
    let mut strings = Vec::new();
    let mut current = String::new();

    for chunk in data.chunks_exact(2) {
        let unit = u16::from_le_bytes([chunk[0], chunk[1]]);
        if unit == 0 {
            if !current.is_empty() {
                strings.push(std::mem::take(&mut current));
            }
        } else if (32..65535).contains(&unit) {
            if let Some(c) = char::from_u32(unit as u32) {
                current.push(c);
            }
        }
    }
    if !current.is_empty() {
        strings.push(current);
    }

    strings
}

fn pool_find(pool: &[String], predicate: impl Fn(&str) -> bool) -> String {
    pool.iter()
        .find(|s| predicate(s.as_str()))
        .cloned()
        .unwrap_or_default()
}

/// A publisher looks like a capitalised name with a space in it.
fn pool_publisher(pool: &[String]) -> String {
    for s in pool {
        if !(3..=100).contains(&s.len()) {
            continue;
        }
        if is_valid_guid(s) || is_valid_version(s) {
            continue;
        }
        if s.contains(' ') && !s.starts_with('{') && s.as_bytes()[0].is_ascii_uppercase() {
            return s.clone();
        }
    }
    String::new()
}

// ---------------------------------------------------------------------------
// Layer 4: nearest-neighbour proximity search
// ---------------------------------------------------------------------------

/// Find a GUID within a window after any occurrence of the property name,
/// searching the UTF-16LE encoding first, then ASCII.
fn guid_near_property(data: &[u8], property: &str) -> String {
    let pattern = utf16le_bytes(property);
    let mut from = 0usize;
    while let Some(pos) = find_bytes(data, &pattern, from) {
        let start = pos + pattern.len();
        let guid = scan_for_guid(data, start, 2048);
        if !guid.is_empty() {
            return guid;
        }
        from = pos + 1;
    }

    let pattern = property.as_bytes();
    let mut from = 0usize;
    while let Some(pos) = find_bytes(data, pattern, from) {
        let start = pos + pattern.len();
        let guid = scan_for_guid(data, start, 1024);
        if !guid.is_empty() {
            return guid;
        }
        from = pos + 1;
    }

    String::new()
}

fn scan_for_guid(data: &[u8], start: usize, window: usize) -> String {
    let end = (start + window).min(data.len());
    if end < 38 {
        return String::new();
    }
    for i in start..end.saturating_sub(38) {
        if data[i] == b'{' {
            let guid = guid_at(data, i);
            if !guid.is_empty() {
                return guid;
            }
        }
    }
    String::new()
}

fn version_near_property(data: &[u8], property: &str) -> String {
    let pattern = utf16le_bytes(property);
    let mut from = 0usize;
    while let Some(pos) = find_bytes(data, &pattern, from) {
        let version = version_after_utf16(data, pos + pattern.len(), 512);
        if !version.is_empty() {
            return version;
        }
        from = pos + 1;
    }
    String::new()
}

fn string_near_property(data: &[u8], property: &str) -> String {
    let pattern = utf16le_bytes(property);
    let mut from = 0usize;
    while let Some(pos) = find_bytes(data, &pattern, from) {
        let start = pos + pattern.len();
        // Step past padding two bytes at a time
        for offset in (0..64).step_by(2) {
            if start + offset >= data.len() {
                break;
            }
            let s = utf16_string_clean(&data[start + offset..]);
            if (3..=128).contains(&s.len()) && !is_valid_guid(&s) && !is_valid_version(&s) {
                return s;
            }
        }
        from = pos + 1;
    }
    String::new()
}

// ---------------------------------------------------------------------------
// UTF-16LE helpers
// ---------------------------------------------------------------------------

fn utf16le_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn guid_after_utf16(data: &[u8], pos: usize) -> String {
    let end = (pos + 128).min(data.len());
    let mut i = pos;
    while i + 1 < end {
        if u16_le(data, i) == Some(b'{' as u16) {
            let guid = utf16_guid(&data[i..]);
            if is_valid_guid(&guid) {
                return guid;
            }
        }
        i += 2;
    }
    String::new()
}

fn utf16_guid(data: &[u8]) -> String {
    let mut chars = String::new();
    for chunk in data.chunks_exact(2).take(38) {
        let unit = u16::from_le_bytes([chunk[0], chunk[1]]);
        if unit == 0 {
            break;
        }
        match char::from_u32(unit as u32) {
            Some(c) => chars.push(c),
            None => break,
        }
    }
    chars
}

fn version_after_utf16(data: &[u8], pos: usize, window: usize) -> String {
    let end = (pos + window).min(data.len());
    let mut i = pos;
    while i + 1 < end {
        let unit = u16_le(data, i).unwrap_or(0);
        if (b'0' as u16..=b'9' as u16).contains(&unit) {
            let version = utf16_version(&data[i..]);
            if is_valid_version(&version) {
                return version;
            }
        }
        i += 2;
    }
    String::new()
}

fn utf16_version(data: &[u8]) -> String {
    let mut chars = String::new();
    for chunk in data.chunks_exact(2) {
        if chars.len() >= 32 {
            break;
        }
        let unit = u16::from_le_bytes([chunk[0], chunk[1]]);
        let c = unit as u8 as char;
        if unit != 0 && (c.is_ascii_digit() || c == '.') && unit < 128 {
            chars.push(c);
        } else {
            break;
        }
    }
    chars
}

fn string_after_utf16(data: &[u8], pos: usize) -> String {
    let end = (pos + 512).min(data.len());
    let mut i = pos;
    while i + 1 < end {
        let unit = u16_le(data, i).unwrap_or(0);
        if (unit as u8 as char).is_ascii_alphabetic() && unit < 128 {
            let s = utf16_string_clean(&data[i..]);
            if (2..=128).contains(&s.len()) && !is_valid_guid(&s) && !is_valid_version(&s) {
                return s;
            }
        }
        i += 2;
    }
    String::new()
}

/// Extract a run of printable ASCII from UTF-16LE data, skipping leading
/// nulls and stopping at the first non-printable unit after the run starts.
fn utf16_string_clean(data: &[u8]) -> String {
    let mut chars = String::new();
    for chunk in data.chunks_exact(2) {
        if chars.len() >= 128 {
            break;
        }
        let unit = u16::from_le_bytes([chunk[0], chunk[1]]);
        if unit == 0 {
            if !chars.is_empty() {
                break;
            }
            continue;
        }
        if (32..127).contains(&unit) {
            chars.push(unit as u8 as char);
        } else if !chars.is_empty() {
            break;
        }
    }
    chars.trim().to_string()
}

// ---------------------------------------------------------------------------
// Value validators
// ---------------------------------------------------------------------------

/// A plausible version: 3-32 chars, digit at both ends, 1-3 dots.
pub fn is_valid_version(s: &str) -> bool {
    let b = s.as_bytes();
    if !(3..=32).contains(&b.len()) {
        return false;
    }
    if !s.contains('.') {
        return false;
    }
    if !b[0].is_ascii_digit() || !b[b.len() - 1].is_ascii_digit() {
        return false;
    }
    let dots = s.matches('.').count();
    (1..=3).contains(&dots)
}

/// Reject product-name candidates that are really UI dialog text.
fn is_valid_product_name(s: &str) -> bool {
    if !(2..=100).contains(&s.len()) {
        return false;
    }

    let first = s.chars().next().unwrap_or(' ');
    let last = s.chars().last().unwrap_or(' ');
    if matches!(first, '[' | ']' | '(' | ')') || matches!(last, '[' | ']' | '(' | ')') {
        return false;
    }

    let lower = s.to_lowercase();
    !DIALOG_TEXT_FRAGMENTS
        .iter()
        .any(|fragment| lower.contains(fragment))
}

fn find_bytes(data: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
    if pattern.is_empty() || data.len() < pattern.len() || from > data.len() - pattern.len() {
        return None;
    }
    (from..=data.len() - pattern.len()).find(|&i| &data[i..i + pattern.len()] == pattern)
}
