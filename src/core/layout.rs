//! Typed view over a drawer's on-disk output layout.
//!
//! Every derived artifact's filename deterministically encodes its region key,
//! so existence checks need no index file. All path math lives here; no other
//! component builds artifact paths by hand.
//!
//! Layout, per drawer root:
//!
//! ```text
//! fullsize/        original full-resolution images
//! preview/         resolution-bounded previews used for detection
//! coordinates/     raw detection JSON per preview
//! trays/           tray crops from the drawer native plane
//! specimens/       specimen crops from tray native planes
//! masks/           binary specimen masks
//! measurements/    measurements.csv
//! transcriptions/  label transcription tables
//! ```

use crate::core::keys::RegionKey;
use std::path::{Path, PathBuf};

/// Extension used for every derived raster artifact.
const RASTER_EXT: &str = "png";

/// Paths of a single drawer's input and output tree.
#[derive(Debug, Clone)]
pub struct DrawerLayout {
    root: PathBuf,
    drawer_id: String,
}

impl DrawerLayout {
    /// Creates a layout rooted at `root` for the drawer named `drawer_id`.
    pub fn new(root: impl Into<PathBuf>, drawer_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            drawer_id: drawer_id.into(),
        }
    }

    /// The drawer identifier this layout serves.
    pub fn drawer_id(&self) -> &str {
        &self.drawer_id
    }

    /// The drawer-level region key.
    pub fn drawer_key(&self) -> RegionKey {
        RegionKey::drawer(self.drawer_id.clone())
    }

    /// Root directory of this drawer's tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of original full-resolution images.
    pub fn fullsize_dir(&self) -> PathBuf {
        self.root.join("fullsize")
    }

    /// Directory of detection previews.
    pub fn preview_dir(&self) -> PathBuf {
        self.root.join("preview")
    }

    /// Directory of raw detection JSON, one file per detected preview.
    pub fn coordinates_dir(&self) -> PathBuf {
        self.root.join("coordinates")
    }

    /// Directory of tray crops.
    pub fn trays_dir(&self) -> PathBuf {
        self.root.join("trays")
    }

    /// Directory of specimen crops.
    pub fn specimens_dir(&self) -> PathBuf {
        self.root.join("specimens")
    }

    /// Directory of binary specimen masks.
    pub fn masks_dir(&self) -> PathBuf {
        self.root.join("masks")
    }

    /// Path of the measurements table.
    pub fn measurements_csv(&self) -> PathBuf {
        self.root.join("measurements").join("measurements.csv")
    }

    /// Directory of transcription tables.
    pub fn transcriptions_dir(&self) -> PathBuf {
        self.root.join("transcriptions")
    }

    /// Path of the label transcription table.
    pub fn transcriptions_csv(&self) -> PathBuf {
        self.transcriptions_dir().join("labels.csv")
    }

    /// Preview image path for a region key (drawer, tray, or specimen level).
    pub fn preview_image(&self, key: &RegionKey) -> PathBuf {
        self.preview_dir().join(format!("{key}.{RASTER_EXT}"))
    }

    /// Detection JSON path for the preview of a region key.
    pub fn coordinates_json(&self, key: &RegionKey) -> PathBuf {
        self.coordinates_dir().join(format!("{key}.json"))
    }

    /// Tray crop path for a tray-level key.
    pub fn tray_image(&self, key: &RegionKey) -> PathBuf {
        self.trays_dir().join(format!("{key}.{RASTER_EXT}"))
    }

    /// Specimen crop path for a specimen-level key.
    pub fn specimen_image(&self, key: &RegionKey) -> PathBuf {
        self.specimens_dir().join(format!("{key}.{RASTER_EXT}"))
    }

    /// Mask path for a specimen-level key. `instance` numbers repeated
    /// target-class instances within one region; instance 1 is the plain
    /// `<key>.png`, later instances are suffixed.
    pub fn mask_image(&self, key: &RegionKey, instance: u32) -> PathBuf {
        let name = if instance <= 1 {
            format!("{key}.{RASTER_EXT}")
        } else {
            format!("{key}_{instance}.{RASTER_EXT}")
        };
        self.masks_dir().join(name)
    }
}
