use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write `records` to `dir/file_name` as 4-space indented JSON, replacing any
/// existing file.
pub fn write_json_file<T, P>(records: &T, dir: P, file_name: &str) -> std::io::Result<PathBuf>
where
    T: Serialize + ?Sized,
    P: AsRef<Path>,
{
    fs::create_dir_all(dir.as_ref())?;
    let path = dir.as_ref().join(file_name);

    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
    records.serialize(&mut serializer)?;
    writer.flush()?;

    Ok(path)
}

pub fn read_json_file<T, P>(path: P) -> std::io::Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}
