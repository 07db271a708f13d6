//! ASiC-E (BDOC) packaging.

use std::io::{Cursor, Write};

use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::error::{Error, Result};

use super::builder::ContainerFile;
use super::xades::escape_attribute;

pub const MIMETYPE: &str = "application/vnd.etsi.asic-e+zip";
pub const MIMETYPE_PATH: &str = "mimetype";
pub const MANIFEST_PATH: &str = "META-INF/manifest.xml";
pub const SIGNATURE_PATH: &str = "META-INF/signatures0.xml";

/// Zip the data files and their signature into an ASiC-E container.
///
/// The uncompressed `mimetype` entry comes first so the format can be
/// sniffed from a fixed offset, then the manifest, the data files in
/// manifest order, and the signature.
pub fn package(files: &[ContainerFile], signature_xml: &str) -> Result<Vec<u8>> {
    for file in files {
        let path = file.entry.path.as_str();
        if path == MIMETYPE_PATH || path.starts_with("META-INF/") || path.is_empty() {
            return Err(Error::InvalidInput(format!(
                "reserved container path {path:?}"
            )));
        }
    }

    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file(MIMETYPE_PATH, stored)?;
    zip.write_all(MIMETYPE.as_bytes())?;

    zip.start_file(MANIFEST_PATH, deflated)?;
    zip.write_all(manifest_xml(files).as_bytes())?;

    for file in files {
        zip.start_file(file.entry.path.as_str(), deflated)?;
        zip.write_all(&file.content)?;
    }

    zip.start_file(SIGNATURE_PATH, deflated)?;
    zip.write_all(signature_xml.as_bytes())?;

    Ok(zip.finish()?.into_inner())
}

/// OpenDocument manifest listing the container and each data file.
pub fn manifest_xml(files: &[ContainerFile]) -> String {
    let mut xml = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="no" ?>"#,
        "\n",
        r#"<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2">"#,
        "\n",
    ));
    xml.push_str(&format!(
        r#"<manifest:file-entry manifest:full-path="/" manifest:media-type="{MIMETYPE}"/>"#
    ));
    xml.push('\n');
    for file in files {
        xml.push_str(&format!(
            r#"<manifest:file-entry manifest:full-path="{}" manifest:media-type="{}"/>"#,
            escape_attribute(&file.entry.path),
            escape_attribute(&file.entry.mime_type)
        ));
        xml.push('\n');
    }
    xml.push_str("</manifest:manifest>\n");
    xml
}
