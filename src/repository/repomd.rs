//! Repository metadata helpers: the `repomd.xml` tag and key file checksums.

use crate::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Read the `tags/repo` value of a `repomd.xml` file.
pub fn read_repo_tag(path: &Path) -> Result<Option<String>> {
    parse_repo_tag(&fs::read_to_string(path)?)
}

/// Extract the first `tags/repo` element text directly under the document root.
///
/// ```xml
/// <repomd xmlns="http://linux.duke.edu/metadata/repo">
///   <tags><repo>obsproduct://...</repo></tags>
/// </repomd>
/// ```
pub fn parse_repo_tag(xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader
            .read_event()
            .map_err(|e| Error::InvalidInput(format!("malformed repomd.xml: {}", e)))?
        {
            Event::Start(element) => {
                path.push(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
            }
            Event::End(_) => {
                // A tags/repo element that closed without text carries no tag.
                if is_repo_tag(&path) {
                    return Ok(None);
                }
                path.pop();
            }
            Event::Text(text) if is_repo_tag(&path) => {
                let value = text
                    .unescape()
                    .map_err(|e| Error::InvalidInput(format!("malformed repomd.xml: {}", e)))?;
                return Ok(Some(value.trim().to_string()));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn is_repo_tag(path: &[String]) -> bool {
    path.len() == 3 && path[1] == "tags" && path[2] == "repo"
}

/// SHA-256 of a file, as lowercase hex.
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(fs::read(path)?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare a computed checksum with an expected one, ignoring case and padding.
pub fn checksum_matches(actual: &str, expected: &str) -> bool {
    actual.trim().eq_ignore_ascii_case(expected.trim())
}
