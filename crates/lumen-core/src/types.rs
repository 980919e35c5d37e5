//! Core data types: effect codes, task records, tasks and results.

use image::{ImageBuffer, Rgba};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};

/// 16-bit RGBA image, the working format of every filter pass.
pub type Rgba16Image = ImageBuffer<Rgba<u16>, Vec<u16>>;

/// A filter effect, encoded as a single character in the task stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Mean of R, G and B into all three channels
    #[serde(rename = "G")]
    Grayscale,
    /// 3×3 sharpen kernel
    #[serde(rename = "S")]
    Sharpen,
    /// 3×3 box average
    #[serde(rename = "B")]
    Blur,
    /// 3×3 edge-detect kernel
    #[serde(rename = "E")]
    EdgeDetect,
}

impl Effect {
    /// The single-character code used in the task stream.
    pub fn code(self) -> char {
        match self {
            Effect::Grayscale => 'G',
            Effect::Sharpen => 'S',
            Effect::Blur => 'B',
            Effect::EdgeDetect => 'E',
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One record of the task-description stream, before path resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Input file, relative to the data directory
    #[serde(rename = "inPath")]
    pub in_path: PathBuf,

    /// Output file name, prefixed with the data directory on resolution
    #[serde(rename = "outPath")]
    pub out_path: PathBuf,

    /// Effects, applied in order
    pub effects: Vec<Effect>,
}

/// A unit of work: one image and its ordered effect chain.
///
/// Owned by exactly one deque, channel or processing context at a time.
#[derive(Debug)]
pub struct ImageTask {
    /// Resolved input path
    pub in_path: PathBuf,

    /// Resolved output path
    pub out_path: PathBuf,

    /// Effects, applied in order
    pub effects: Vec<Effect>,

    /// Data directory this task was generated from
    pub data_dir: String,

    /// Filled in once every effect has been applied
    pub processed: Option<Rgba16Image>,
}

impl ImageTask {
    /// Create an unprocessed task.
    pub fn new(
        in_path: impl Into<PathBuf>,
        out_path: impl Into<PathBuf>,
        effects: Vec<Effect>,
        data_dir: impl Into<String>,
    ) -> Self {
        Self {
            in_path: in_path.into(),
            out_path: out_path.into(),
            effects,
            data_dir: data_dir.into(),
            processed: None,
        }
    }

    /// Effect codes as a compact string, e.g. `"SGB"`.
    pub fn effect_codes(&self) -> String {
        self.effects.iter().map(|e| e.code()).collect()
    }
}

/// A completed task paired with its final buffer and destination.
///
/// Immutable once built; consumed by exactly one sink.
#[derive(Debug)]
pub struct ImageResult {
    task: ImageTask,
    image: Rgba16Image,
}

impl ImageResult {
    /// Take the processed image out of `task`.
    pub fn from_task(mut task: ImageTask) -> PipelineResult<Self> {
        match task.processed.take() {
            Some(image) => Ok(Self { task, image }),
            None => Err(PipelineError::Incomplete {
                path: task.in_path.clone(),
            }),
        }
    }

    /// The task this result was produced from.
    pub fn task(&self) -> &ImageTask {
        &self.task
    }

    /// Final image buffer.
    pub fn image(&self) -> &Rgba16Image {
        &self.image
    }

    /// Destination path.
    pub fn out_path(&self) -> &std::path::Path {
        &self.task.out_path
    }
}

/// Totals reported by either strategy at the end of a run.
///
/// Every generated task is processed, failed or stranded, and every
/// processed task is either saved or counted in `saves_failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Tasks decoded from the task stream
    pub tasks_generated: u64,
    /// Tasks that finished every effect pass
    pub tasks_processed: u64,
    /// Tasks dropped because their image failed to load
    pub tasks_failed: u64,
    /// Accepted tasks that no worker finished after a worker aborted
    pub tasks_stranded: u64,
    /// Results written by the codec
    pub images_saved: u64,
    /// Processed results dropped because the save failed
    pub saves_failed: u64,
    /// Tasks moved between workers by stealing
    pub steals: u64,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_task_record() {
        let json = r#"{"inPath": "IMG_2029.png", "outPath": "IMG_2029_Out.png", "effects": ["S","B","E"]}"#;
        let record: TaskRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.in_path, PathBuf::from("IMG_2029.png"));
        assert_eq!(record.out_path, PathBuf::from("IMG_2029_Out.png"));
        assert_eq!(
            record.effects,
            vec![Effect::Sharpen, Effect::Blur, Effect::EdgeDetect]
        );
    }

    #[test]
    fn test_unknown_effect_code_is_rejected() {
        let json = r#"{"inPath": "a.png", "outPath": "b.png", "effects": ["X"]}"#;
        assert!(serde_json::from_str::<TaskRecord>(json).is_err());
    }

    #[test]
    fn test_effect_codes() {
        let task = ImageTask::new(
            "in.png",
            "out.png",
            vec![Effect::Grayscale, Effect::Blur],
            "small",
        );
        assert_eq!(task.effect_codes(), "GB");
    }

    #[test]
    fn test_result_requires_processed_image() {
        let task = ImageTask::new("in.png", "out.png", vec![], "small");
        let err = ImageResult::from_task(task).unwrap_err();
        assert!(matches!(err, PipelineError::Incomplete { .. }));

        let mut task = ImageTask::new("in.png", "out.png", vec![], "small");
        task.processed = Some(Rgba16Image::new(2, 2));
        let result = ImageResult::from_task(task).unwrap();
        assert_eq!(result.image().dimensions(), (2, 2));
        assert!(result.task().processed.is_none());
        assert_eq!(result.out_path(), std::path::Path::new("out.png"));
    }
}
