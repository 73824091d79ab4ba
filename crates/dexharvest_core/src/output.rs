use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::model::{BaseEntity, IdRange, OriginRecord};
use crate::tcg::{TcgTypeInfo, TcgTypedEntity};
use crate::types::{TypeInfo, TypedEntity};

pub const TYPES_INFO_FILE: &str = "types_info.json";
pub const TCG_TYPES_INFO_FILE: &str = "tcg_types_info.json";

pub fn base_file_name(range: IdRange) -> String {
    format!("pokemon_base_{}.json", range.tag())
}

pub fn origins_file_name(range: IdRange) -> String {
    format!("name_origins_{}.json", range.tag())
}

pub fn typed_base_file_name(range: IdRange) -> String {
    format!("pokemon_base_{}_with_types.json", range.tag())
}

pub fn tcg_base_file_name(range: IdRange) -> String {
    format!("pokemon_base_{}_with_tcg_types.json", range.tag())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub base: PathBuf,
    pub origins: PathBuf,
}

/// Write the base list and the id-keyed origin map for one run.
pub fn write_harvest(
    output_dir: &Path,
    range: IdRange,
    entities: &[BaseEntity],
    origins: &BTreeMap<u32, OriginRecord>,
) -> Result<WrittenFiles> {
    let base = output_dir.join(base_file_name(range));
    let origins_path = output_dir.join(origins_file_name(range));
    write_json(&base, &entities)?;
    write_json(&origins_path, origins)?;
    Ok(WrittenFiles {
        base,
        origins: origins_path,
    })
}

pub fn write_types(
    output_dir: &Path,
    range: IdRange,
    catalog: &BTreeMap<String, TypeInfo>,
    entities: &[TypedEntity],
) -> Result<(PathBuf, PathBuf)> {
    let info = output_dir.join(TYPES_INFO_FILE);
    let typed = output_dir.join(typed_base_file_name(range));
    write_json(&info, catalog)?;
    write_json(&typed, &entities)?;
    Ok((info, typed))
}

pub fn write_tcg_types(
    output_dir: &Path,
    range: IdRange,
    catalog: &BTreeMap<String, TcgTypeInfo>,
    records: &[TcgTypedEntity],
) -> Result<(PathBuf, PathBuf)> {
    let info = output_dir.join(TCG_TYPES_INFO_FILE);
    let typed = output_dir.join(tcg_base_file_name(range));
    write_json(&info, catalog)?;
    write_json(&typed, &records)?;
    Ok((info, typed))
}

pub fn load_base_entities(path: &Path) -> Result<Vec<BaseEntity>> {
    load_records(path)
}

/// Read a JSON array of records written by an earlier command.
pub fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Pretty, UTF-8, two-space JSON; creates the parent directory.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut rendered = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    rendered.push('\n');
    fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}
