//! Cheap detection of a configuration file's model from its root element.

use crate::error::{Error, Result};
use crate::types::ConfigModel;
use std::fs;
use std::path::Path;

/// Model of the configuration file at `path`.
pub fn sniff_model(path: &Path) -> Result<ConfigModel> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    sniff(&content).ok_or_else(|| Error::UnknownModel {
        path: path.to_path_buf(),
    })
}

/// Model named by the first element of `xml`, skipping the prolog.
pub fn sniff(xml: &str) -> Option<ConfigModel> {
    let mut rest = xml.trim_start_matches('\u{feff}');
    loop {
        rest = rest.trim_start();
        if rest.starts_with("<?") {
            rest = skip_past(rest, "?>")?;
        } else if rest.starts_with("<!--") {
            rest = skip_past(rest, "-->")?;
        } else if rest.starts_with("<!") {
            rest = skip_past(rest, ">")?;
        } else {
            break;
        }
    }

    let tag = rest.strip_prefix('<')?;
    let end = tag
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(tag.len());
    let name = &tag[..end];
    // tolerate a namespace prefix
    let local = name.rsplit(':').next().unwrap_or(name);
    match local {
        "server" => Some(ConfigModel::Standalone),
        "domain" => Some(ConfigModel::Domain),
        "host" => Some(ConfigModel::Host),
        _ => None,
    }
}

fn skip_past<'a>(text: &'a str, terminator: &str) -> Option<&'a str> {
    text.find(terminator).map(|i| &text[i + terminator.len()..])
}
