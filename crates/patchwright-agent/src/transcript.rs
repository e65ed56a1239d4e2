//! On-disk per-round transcripts
//!
//! Each run writes `<round>_prompt.txt` and `<round>_response.txt` under
//! `<history_output_path>/<instance_id>/`. The directory is cleared at run
//! start so a transcript always describes a single run.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct Transcript {
    dir: PathBuf,
}

impl Transcript {
    pub fn prepare(base: &Path, instance_id: &str) -> std::io::Result<Self> {
        let mut id = instance_id.replace('/', "__");
        if id.is_empty() {
            id = "default".to_string();
        }
        let dir = base.join(id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, round: usize, kind: &str, text: &str) {
        let path = self.dir.join(format!("{round}_{kind}.txt"));
        if let Err(err) = fs::write(&path, text) {
            warn!("failed to write transcript {}: {}", path.display(), err);
        }
    }
}

pub fn format_prompt_text(system: &str, user: &str) -> String {
    format!("[system text]\n{system}\n\n[prompt text]\n{user}")
        .trim()
        .to_string()
}
