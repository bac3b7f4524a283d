use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde_derive::Deserialize;

use crate::error::{Error, Result};
use crate::record::ImageMetadata;

/// Frames and their declared metadata
pub trait FrameSource {
    fn metadata_for(&self, path: &Path) -> Result<ImageMetadata>;
    fn load(&self, path: &Path) -> Result<RgbImage>;
}

/// Ordered frames of one sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub name: String,
    pub frames: Vec<PathBuf>,
}

/// Groups frame paths by their parent directory. Sequences come out sorted
/// by name and their frames sorted by path.
pub fn group_sequences<I, P>(paths: I) -> Vec<Sequence>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for path in paths {
        let path = path.into();
        let name = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        groups.entry(name).or_default().push(path);
    }

    groups
        .into_iter()
        .map(|(name, mut frames)| {
            frames.sort();
            Sequence { name, frames }
        })
        .collect()
}

#[derive(Deserialize)]
struct CocoFile {
    images: Vec<ImageMetadata>,
}

/// Image metadata of a COCO annotation file, looked up by file name
#[derive(Debug, Clone, Default)]
pub struct CocoIndex {
    // base name -> entries whose file_name ends with it
    images: HashMap<String, Vec<ImageMetadata>>,
}

impl CocoIndex {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let coco: CocoFile = serde_json::from_str(s)?;
        let mut images: HashMap<String, Vec<ImageMetadata>> = HashMap::new();

        for image in coco.images {
            let base = Path::new(&image.file_name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            images.entry(base).or_default().push(image);
        }

        Ok(Self { images })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        Self::from_json_str(&content)
    }

    pub fn len(&self) -> usize {
        self.images.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Entry whose `file_name` is a suffix of `path`; the longest match wins
    /// when several sequences share a frame base name.
    pub fn get(&self, path: &Path) -> Option<&ImageMetadata> {
        let base = path.file_name()?.to_string_lossy();

        self.images
            .get(&*base)?
            .iter()
            .filter(|image| path.ends_with(&image.file_name))
            .max_by_key(|image| Path::new(&image.file_name).components().count())
    }
}

/// Decodes frames from disk, metadata comes from a COCO index
pub struct ImageFileSource {
    index: CocoIndex,
}

impl ImageFileSource {
    pub fn new(index: CocoIndex) -> Self {
        Self { index }
    }
}

impl FrameSource for ImageFileSource {
    fn metadata_for(&self, path: &Path) -> Result<ImageMetadata> {
        self.index
            .get(path)
            .cloned()
            .ok_or_else(|| Error::MissingMetadata(path.to_path_buf()))
    }

    fn load(&self, path: &Path) -> Result<RgbImage> {
        Ok(image::open(path)?.to_rgb8())
    }
}
