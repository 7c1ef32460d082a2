use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use super::error::ExportError;
use super::schedule::ControlSchedule;

/// `<dir>/<stem>_controls.json` next to the analysed source.
pub fn default_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "schedule".to_string());
    let dir = source.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{}_controls.json", stem))
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleExporter {
    pub pretty: bool,
}

impl Default for ScheduleExporter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl ScheduleExporter {
    pub fn write(&self, schedule: &ControlSchedule, path: &Path) -> Result<(), ExportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, schedule)?;
        } else {
            serde_json::to_writer(&mut writer, schedule)?;
        }
        writer.flush()?;

        info!(
            "💾 Exported {} frames of controls to {:?}",
            schedule.metadata.frame_count, path
        );
        Ok(())
    }

    pub fn read(path: &Path) -> Result<ControlSchedule, ExportError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
