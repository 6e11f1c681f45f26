use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use image::{DynamicImage, RgbImage};

use crate::annotate::Annotator;
use crate::error::BatchError;
use crate::files;
use crate::ocr::Ocr;
use crate::report::{Report, ReportRow};

pub const RESULT_PREFIX: &str = "result_";
pub const DONE_MESSAGE: &str = "Extract text from image process done.";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// An input image with its detections drawn on, plus the rows describing them.
pub struct Annotated {
    pub image: RgbImage,
    pub report: Report,
}

/// `output_dir/result_<file name>`
pub fn result_path(input: &Path, output_dir: &Path) -> PathBuf {
    let mut name = OsString::from(RESULT_PREFIX);
    if let Some(file_name) = input.file_name() {
        name.push(file_name);
    }
    output_dir.join(name)
}

pub fn ensure_output_dir(dir: &Path) -> Result<(), BatchError> {
    std::fs::create_dir_all(dir).map_err(|source| BatchError::OutputDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Picks the decoder from the file's magic bytes, falling back to the extension.
fn decode(path: &Path) -> image::ImageResult<DynamicImage> {
    image::io::Reader::open(path)?.with_guessed_format()?.decode()
}

/// Decodes `path`, runs OCR on it and draws every detection.
pub fn annotate_file<O: Ocr + ?Sized>(
    path: &Path,
    ocr: &mut O,
    annotator: &Annotator,
) -> Result<Annotated, BatchError> {
    let img = decode(path).map_err(|source| BatchError::UnreadableImage {
        path: path.to_path_buf(),
        source,
    })?;

    let detections = ocr.recognize(&img).map_err(|e| BatchError::Ocr {
        path: path.to_path_buf(),
        reason: format!("{e:#}"),
    })?;

    let mut image = img.to_rgb8();
    let mut report = Report::new();
    for detection in &detections {
        let bbox = detection.bounding_box();
        report.push(ReportRow::new(detection, &bbox));
        annotator.annotate(&mut image, detection, &bbox);
    }
    Ok(Annotated { image, report })
}

pub fn save_result(image: &RgbImage, input: &Path, output_dir: &Path) -> Result<PathBuf, BatchError> {
    let dest = result_path(input, output_dir);
    image.save(&dest).map_err(|source| BatchError::Save {
        path: dest.clone(),
        source,
    })?;
    Ok(dest)
}

/// Runs one file end to end, printing its table to `out`.
fn process_file<O: Ocr + ?Sized, W: Write>(
    path: &Path,
    output_dir: &Path,
    ocr: &mut O,
    annotator: &Annotator,
    out: &mut W,
) -> Result<Result<PathBuf, BatchError>> {
    let annotated = match annotate_file(path, ocr, annotator) {
        Ok(a) => a,
        Err(e) => return Ok(Err(e)),
    };
    writeln!(out, "{}", annotated.report)?;
    Ok(save_result(&annotated.image, path, output_dir))
}

/// Processes every image in `input_dir`, writing annotated copies to `output_dir`.
///
/// Failures on a single file are reported to `out` and the batch moves on.
/// Only a missing input directory, an output directory that cannot be
/// created, or a broken `out` stream end the run early.
pub fn process_directory<O: Ocr + ?Sized, W: Write>(
    input_dir: &Path,
    output_dir: &Path,
    ocr: &mut O,
    annotator: &Annotator,
    out: &mut W,
) -> Result<BatchSummary> {
    let images = files::list_images(input_dir)?;
    if let Err(e) = ensure_output_dir(output_dir) {
        tracing::error!(kind = e.kind(), path = %e.path().display(), "{e}");
        return Err(e.into());
    }
    tracing::info!(count = images.len(), input = %input_dir.display(), "starting batch");

    let mut summary = BatchSummary::default();
    for path in &images {
        writeln!(out, "\nProcessing: {}", path.display())?;
        let started = Instant::now();

        match process_file(path, output_dir, ocr, annotator, out)? {
            Ok(dest) => {
                summary.processed += 1;
                tracing::debug!(
                    output = %dest.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "saved"
                );
            }
            Err(BatchError::UnreadableImage { path, source }) => {
                summary.skipped += 1;
                tracing::debug!(path = %path.display(), "decode failed: {source}");
                writeln!(out, "Warning: Could not read {}. Skipping.", path.display())?;
            }
            Err(e) => {
                summary.failed += 1;
                tracing::debug!(kind = e.kind(), path = %e.path().display(), "{e}");
                writeln!(out, "Error processing {}: {}", path.display(), e)?;
            }
        }
    }

    writeln!(out, "\n{DONE_MESSAGE}")?;
    tracing::info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        "batch finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use anyhow::anyhow;
    use image::{DynamicImage, GenericImageView, Rgb};

    use super::*;
    use crate::annotate::ACCENT;
    use crate::ocr::{Detection, Point};

    /// Answers by image width so tests don't depend on listing order.
    #[derive(Default)]
    struct ScriptedOcr {
        by_width: HashMap<u32, std::result::Result<Vec<Detection>, String>>,
        calls: usize,
    }

    impl ScriptedOcr {
        fn with(mut self, width: u32, reply: std::result::Result<Vec<Detection>, String>) -> Self {
            self.by_width.insert(width, reply);
            self
        }
    }

    impl Ocr for ScriptedOcr {
        fn recognize(&mut self, img: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
            self.calls += 1;
            match self.by_width.get(&img.width()) {
                Some(Ok(d)) => Ok(d.clone()),
                Some(Err(msg)) => Err(anyhow!(msg.clone())),
                None => Ok(vec![]),
            }
        }
    }

    fn quad(x0: f32, y0: f32, x1: f32, y1: f32) -> [Point; 4] {
        [
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    fn write_image(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn run(input: &Path, output: &Path, ocr: &mut ScriptedOcr) -> (BatchSummary, String) {
        let mut out = Vec::new();
        let summary =
            process_directory(input, output, ocr, &Annotator::embedded().unwrap(), &mut out).unwrap();
        (summary, String::from_utf8(out).unwrap())
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn result_name_keeps_original_file_name() {
        assert_eq!(
            result_path(Path::new("content/Scan 1.PNG"), Path::new("results")),
            PathBuf::from("results/result_Scan 1.PNG")
        );
    }

    #[test]
    fn image_without_text_is_still_saved() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let src = write_image(input.path(), "blank.png", 32, 24);

        let (summary, out) = run(input.path(), output.path(), &mut ScriptedOcr::default());

        assert_eq!(summary, BatchSummary { processed: 1, skipped: 0, failed: 0 });
        assert!(out.contains(&format!("\nProcessing: {}\n", src.display())));
        assert!(out.lines().any(|l| l == "No text detected."));
        assert!(out.ends_with("\nExtract text from image process done.\n"));

        let saved = image::open(output.path().join("result_blank.png")).unwrap();
        assert_eq!(saved.dimensions(), (32, 24));
    }

    #[test]
    fn detections_are_tabulated_and_drawn() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_image(input.path(), "doc.png", 40, 40);
        let mut ocr = ScriptedOcr::default().with(
            40,
            Ok(vec![Detection::new(quad(1.0, 5.0, 9.0, 20.0), "Invoice", 0.93678)]),
        );

        let (_, out) = run(input.path(), output.path(), &mut ocr);

        assert!(out.contains("Text Confidence X_min Y_min X_max Y_max"));
        assert!(out.contains("Invoice       0.94     1     5     9    20"));
        assert!(!out.contains("No text detected."));

        let saved = image::open(output.path().join("result_doc.png")).unwrap().to_rgb8();
        assert_eq!(saved.get_pixel(1, 5), &ACCENT);
        assert_eq!(saved.get_pixel(9, 20), &ACCENT);
        assert_eq!(saved.get_pixel(5, 12), &Rgb([255, 255, 255]));
    }

    #[test]
    fn rows_follow_detection_order() {
        let input = tempfile::tempdir().unwrap();
        let src = write_image(input.path(), "page.png", 50, 30);
        let mut ocr = ScriptedOcr::default().with(
            50,
            Ok(vec![
                Detection::new(quad(30.5, 2.0, 45.9, 9.0), "second", 0.71),
                Detection::new(quad(2.0, 2.0, 20.0, 9.0), "first", 0.99),
            ]),
        );

        let annotated = annotate_file(&src, &mut ocr, &Annotator::embedded().unwrap()).unwrap();

        let texts: Vec<&str> = annotated.report.rows().iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "first"]);
        assert_eq!(annotated.report.rows()[0].x_max, 45);
        assert_eq!(annotated.image.dimensions(), (50, 30));
    }

    #[test]
    fn undecodable_file_is_skipped_with_warning() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let bad = input.path().join("broken.png");
        std::fs::write(&bad, b"definitely not a png").unwrap();
        write_image(input.path(), "good.bmp", 16, 16);
        let mut ocr = ScriptedOcr::default();

        let (summary, out) = run(input.path(), output.path(), &mut ocr);

        assert_eq!(summary, BatchSummary { processed: 1, skipped: 1, failed: 0 });
        assert!(out.contains(&format!("Warning: Could not read {}. Skipping.", bad.display())));
        assert_eq!(listing(output.path()), vec!["result_good.bmp"]);
        assert_eq!(ocr.calls, 1);
    }

    #[test]
    fn ocr_failure_is_reported_and_batch_continues() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let failing = write_image(input.path(), "a.png", 10, 10);
        write_image(input.path(), "b.png", 20, 10);
        let mut ocr = ScriptedOcr::default().with(10, Err("model exploded".into()));

        let (summary, out) = run(input.path(), output.path(), &mut ocr);

        assert_eq!(summary, BatchSummary { processed: 1, skipped: 0, failed: 1 });
        assert!(out.contains(&format!("Error processing {}: model exploded", failing.display())));
        assert_eq!(listing(output.path()), vec!["result_b.png"]);
        assert!(out.ends_with(&format!("\n{DONE_MESSAGE}\n")));
    }

    #[test]
    fn non_images_are_ignored() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_image(input.path(), "shot.PNG", 8, 8);
        std::fs::write(input.path().join("anim.GIF"), b"GIF89a").unwrap();
        std::fs::write(input.path().join("readme.txt"), b"hi").unwrap();

        let (summary, out) = run(input.path(), output.path(), &mut ScriptedOcr::default());

        assert_eq!(summary.processed, 1);
        assert!(!out.contains("anim.GIF"));
        assert_eq!(listing(output.path()), vec!["result_shot.PNG"]);
        assert!(image::open(output.path().join("result_shot.PNG")).is_ok());
    }

    #[test]
    fn rerun_overwrites_previous_results() {
        let input = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let output = root.path().join("nested").join("results");
        write_image(input.path(), "one.png", 12, 12);
        write_image(input.path(), "two.png", 14, 12);

        run(input.path(), &output, &mut ScriptedOcr::default());
        let first = listing(&output);
        run(input.path(), &output, &mut ScriptedOcr::default());

        assert_eq!(first, vec!["result_one.png", "result_two.png"]);
        assert_eq!(listing(&output), first);
    }

    #[test]
    fn empty_input_still_prints_completion() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let (summary, out) = run(input.path(), output.path(), &mut ScriptedOcr::default());
        assert_eq!(summary, BatchSummary::default());
        assert_eq!(out, format!("\n{DONE_MESSAGE}\n"));
    }

    #[test]
    fn mislabeled_png_is_decoded() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let png = write_image(input.path(), "photo.png", 18, 12);
        std::fs::rename(&png, input.path().join("photo.jpg")).unwrap();

        let (summary, out) = run(input.path(), output.path(), &mut ScriptedOcr::default());

        assert_eq!(summary, BatchSummary { processed: 1, skipped: 0, failed: 0 });
        assert!(!out.contains("Warning"));
        assert_eq!(listing(output.path()), vec!["result_photo.jpg"]);
    }

    #[test]
    fn output_dir_blocked_by_file_is_fatal() {
        let input = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        write_image(input.path(), "one.png", 8, 8);
        let output = root.path().join("results");
        std::fs::write(&output, b"not a directory").unwrap();

        let mut out = Vec::new();
        let err = process_directory(
            input.path(),
            &output,
            &mut ScriptedOcr::default(),
            &Annotator::embedded().unwrap(),
            &mut out,
        )
        .unwrap_err();

        let err = err.downcast_ref::<BatchError>().unwrap();
        assert_eq!(err.kind(), "output_dir");
        assert_eq!(err.path(), &output);
        assert!(out.is_empty());
    }

    #[test]
    fn missing_input_directory_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let output = root.path().join("results");
        let mut out = Vec::new();
        let res = process_directory(
            &root.path().join("content"),
            &output,
            &mut ScriptedOcr::default(),
            &Annotator::embedded().unwrap(),
            &mut out,
        );
        assert!(res.is_err());
        assert!(out.is_empty());
        assert!(!output.exists());
    }
}
