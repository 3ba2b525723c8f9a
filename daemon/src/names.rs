// The hub keeps user assigned names in a single store slot as a small text blob:
//
//   NAMES
//   18.0.<port>=<name>
//   3.0=<name>
//
// Keys are <entity>.<index>[.<subindex>], where the entity is the command code of the thing
// being named (the USB entity for ports, the System entity for the hub itself).

use hubtool_types::{default_name, MAX_PORTS, SYSTEM_NAME_INDEX};
use hubtool_usb::commands::Entity;
use log::{debug, warn};

const HEADER: &str = "NAMES";

/// The most the name slot will hold.
pub const NAME_STORE_LIMIT: usize = 4095;

pub const NAME_COUNT: usize = MAX_PORTS + 1;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum NameStoreError {
    #[error("Names too long to be saved to the device (current is {length}; max={limit} characters)")]
    TooLong { length: usize, limit: usize },
}

/// User assigned names, indexed by port with the hub at the end. An empty entry means the
/// user hasn't named it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTable {
    names: [String; NAME_COUNT],
}

impl NameTable {
    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn set(&mut self, index: usize, name: String) -> bool {
        match self.names.get_mut(index) {
            Some(entry) => {
                *entry = name;
                true
            }
            None => false,
        }
    }

    /// The name to display, falling back to the default when unset.
    pub fn effective(&self, index: usize) -> String {
        match self.get(index) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => default_name(index),
        }
    }
}

/// Strips the characters the blob format uses as delimiters.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '=' => ':',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

pub fn decode(blob: &[u8]) -> NameTable {
    let mut table = NameTable::default();

    // The slot may be padded out with NULs.
    let end = blob.iter().position(|&c| c == 0).unwrap_or(blob.len());
    let text = String::from_utf8_lossy(&blob[..end]);

    let mut lines = text.split('\n');
    if lines.next() != Some(HEADER) {
        debug!("No stored names found on the hub");
        return table;
    }

    for line in lines {
        if line.is_empty() {
            break;
        }

        let parts: Vec<&str> = line.split('=').collect();
        if parts.len() != 2 {
            warn!("Couldn't parse key=name from stored name line \"{}\"", line);
            continue;
        }

        match parse_key(parts[0]) {
            Some(index) => {
                table.set(index, parts[1].to_string());
            }
            None => warn!("Unsupported name command: {}", parts[0]),
        }
    }
    table
}

// Returns the name index a key refers to, if it refers to something we name.
fn parse_key(key: &str) -> Option<usize> {
    let values: Vec<u8> = key
        .split('.')
        .map(|part| part.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .ok()?;

    match values.as_slice() {
        [entity, _] if Entity::from_id(*entity) == Some(Entity::System) => {
            Some(SYSTEM_NAME_INDEX)
        }
        [entity, _, port]
            if Entity::from_id(*entity) == Some(Entity::Usb) && (*port as usize) < MAX_PORTS =>
        {
            Some(*port as usize)
        }
        _ => None,
    }
}

pub fn encode(table: &NameTable) -> Result<String, NameStoreError> {
    let mut blob = format!("{HEADER}\n");

    for port in 0..MAX_PORTS {
        if let Some(name) = table.get(port).filter(|name| !name.is_empty()) {
            blob += &format!("{}.0.{}={}\n", Entity::Usb.id(), port, name);
        }
    }

    if let Some(name) = table.get(SYSTEM_NAME_INDEX).filter(|name| !name.is_empty()) {
        blob += &format!("{}.0={}\n", Entity::System.id(), name);
    }

    if blob.len() > NAME_STORE_LIMIT {
        return Err(NameStoreError::TooLong {
            length: blob.len(),
            limit: NAME_STORE_LIMIT,
        });
    }
    Ok(blob)
}
