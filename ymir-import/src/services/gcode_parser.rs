//! Slicer G-code metadata extraction
//!
//! Reads the comment header that slicers embed in G-code output. The first
//! line decides the dialect:
//!
//! - PrusaSlicer: `; key = value` comments plus an optional base64 PNG
//!   thumbnail between `; thumbnail begin` and `; thumbnail end`
//! - Marlin flavour (Cura): `;KEY:value` comments
//!
//! The whole file is streamed line by line; non-comment lines are skipped.

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use ymir_common::model::{PrintMetadata, SlicerDialect};

const COMMENT_MARKER: char = ';';
const PRUSA_SIGNATURE: &str = "PrusaSlicer";
const MARLIN_SIGNATURE: &str = "Marlin";
const THUMBNAIL_BEGIN: &str = "thumbnail begin";
const THUMBNAIL_END: &str = "thumbnail end";
const THUMBNAIL_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// G-code parsing errors
#[derive(Debug, Error)]
pub enum GcodeError {
    /// First line carries no known slicer signature
    #[error("Unsupported G-code dialect in {}: {header:?}", .path.display())]
    UnsupportedDialect { path: PathBuf, header: String },

    /// File could not be opened or read
    #[error("Error reading {} at line {line}: {source}", .path.display())]
    Io {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Embedded thumbnail could not be decoded
#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("not a PNG image: {0}")]
    Png(#[from] image::ImageError),
}

/// Metadata parser for a single G-code file
pub struct GcodeParser {
    path: PathBuf,
}

impl GcodeParser {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the file and extract its metadata
    pub fn parse(&self) -> Result<PrintMetadata, GcodeError> {
        tracing::debug!(path = %self.path.display(), "Parsing G-code file");

        let file = File::open(&self.path).map_err(|source| GcodeError::Io {
            path: self.path.clone(),
            line: 0,
            source,
        })?;

        self.parse_reader(BufReader::new(file))
    }

    /// Extract metadata from any buffered source; `self.path` is used for errors
    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<PrintMetadata, GcodeError> {
        let mut lines = LineReader::new(reader, &self.path);

        let header = lines.next_line()?.unwrap_or_default();
        let dialect = detect_dialect(&header).ok_or_else(|| GcodeError::UnsupportedDialect {
            path: self.path.clone(),
            header: header.clone(),
        })?;

        let mut metadata = PrintMetadata {
            gcode_type: Some(dialect),
            ..Default::default()
        };

        match dialect {
            SlicerDialect::Prusa => {
                parse_prusa_header(&header, &mut metadata);
                self.scan_prusa(&mut lines, &mut metadata)?;
            }
            SlicerDialect::Marlin => self.scan_marlin(&mut lines, &mut metadata)?,
        }

        tracing::debug!(
            path = %self.path.display(),
            dialect = %dialect,
            lines = lines.line_number,
            has_thumbnail = metadata.thumbnail.is_some(),
            "Extracted G-code metadata"
        );

        Ok(metadata)
    }

    fn scan_prusa<R: BufRead>(
        &self,
        lines: &mut LineReader<'_, R>,
        metadata: &mut PrintMetadata,
    ) -> Result<(), GcodeError> {
        while let Some(line) = lines.next_line()? {
            let Some(comment) = line.strip_prefix(COMMENT_MARKER) else {
                continue;
            };
            let comment = comment.trim();

            if comment.starts_with(THUMBNAIL_BEGIN) {
                let start_line = lines.line_number;
                let payload = read_thumbnail_block(lines)?;
                match decode_thumbnail(&payload) {
                    Ok(uri) => metadata.thumbnail = Some(uri),
                    Err(e) => tracing::warn!(
                        path = %self.path.display(),
                        line = start_line,
                        "Skipping unreadable thumbnail: {}",
                        e
                    ),
                }
                continue;
            }

            let Some((key, value)) = comment.split_once('=') else {
                continue;
            };
            let value = Some(value.trim().to_string());
            match key.trim() {
                "estimated printing time (normal mode)" => metadata.total_time = value,
                "layer_height" => metadata.layer_height = value,
                "total filament used [g]" => metadata.filament_used_g = value,
                "filament_type" => metadata.material = value,
                "nozzle_diameter" => metadata.nozzle_diameter = value,
                "filament used [mm]" => metadata.filament_used_m = value,
                "printer_model" => metadata.printer_type = value,
                _ => {}
            }
        }

        Ok(())
    }

    fn scan_marlin<R: BufRead>(
        &self,
        lines: &mut LineReader<'_, R>,
        metadata: &mut PrintMetadata,
    ) -> Result<(), GcodeError> {
        while let Some(line) = lines.next_line()? {
            let Some(comment) = line.strip_prefix(COMMENT_MARKER) else {
                continue;
            };

            if comment.contains("Generated") {
                metadata.created_by = Some(comment.trim().to_string());
                continue;
            }

            let Some((key, value)) = comment.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "TIME" => match value.parse::<u64>() {
                    Ok(seconds) => metadata.total_time = Some(format_duration(seconds)),
                    Err(e) => tracing::warn!(
                        path = %self.path.display(),
                        line = lines.line_number,
                        "Ignoring non-numeric TIME {:?}: {}",
                        value,
                        e
                    ),
                },
                "Filament used" => metadata.filament_used_m = Some(value.to_string()),
                "Layer height" => metadata.layer_height = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(())
    }
}

/// Parse the G-code file at `path`
pub fn parse(path: &Path) -> Result<PrintMetadata, GcodeError> {
    GcodeParser::new(path).parse()
}

/// Identify the slicer dialect from the first line of a file
pub fn detect_dialect(first_line: &str) -> Option<SlicerDialect> {
    if !first_line.starts_with(COMMENT_MARKER) {
        return None;
    }

    if first_line.contains(PRUSA_SIGNATURE) {
        Some(SlicerDialect::Prusa)
    } else if first_line.contains(MARLIN_SIGNATURE) {
        Some(SlicerDialect::Marlin)
    } else {
        None
    }
}

/// `; generated by PrusaSlicer 2.6.1 on 2023-10-01 at 18:21:44 UTC`
fn parse_prusa_header(header: &str, metadata: &mut PrintMetadata) {
    let text = header.trim_start_matches(COMMENT_MARKER).trim();
    let Some(idx) = text.find("generated by") else {
        return;
    };
    let rest = text[idx + "generated by".len()..].trim();

    match rest.split_once(" on ") {
        Some((slicer, when)) => {
            metadata.created_by = Some(slicer.trim().to_string());
            metadata.created_date = Some(match when.split_once(" at ") {
                Some((date, time)) => format!("{} {}", date.trim(), time.trim()),
                None => when.trim().to_string(),
            });
        }
        None => metadata.created_by = Some(rest.to_string()),
    }
}

/// Concatenate the payload lines up to the end marker (or end of file)
fn read_thumbnail_block<R: BufRead>(lines: &mut LineReader<'_, R>) -> Result<String, GcodeError> {
    let mut payload = String::new();
    while let Some(line) = lines.next_line()? {
        let text = line.trim_start_matches(COMMENT_MARKER).trim();
        if text.starts_with(THUMBNAIL_END) {
            break;
        }
        payload.push_str(text);
    }
    Ok(payload)
}

/// Validate a base64 PNG payload and wrap it in a data URI
pub fn decode_thumbnail(payload: &str) -> Result<String, ThumbnailError> {
    let bytes = general_purpose::STANDARD.decode(payload)?;
    image::load_from_memory_with_format(&bytes, ImageFormat::Png)?;
    Ok(format!("{}{}", THUMBNAIL_DATA_URI_PREFIX, payload))
}

/// Format whole seconds as `1h30m0s`, `2m5s` or `42s`
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Line iterator that tracks line numbers and tolerates invalid UTF-8
struct LineReader<'a, R> {
    reader: R,
    path: &'a Path,
    buf: Vec<u8>,
    line_number: usize,
}

impl<'a, R: BufRead> LineReader<'a, R> {
    fn new(reader: R, path: &'a Path) -> Self {
        Self {
            reader,
            path,
            buf: Vec::with_capacity(256),
            line_number: 0,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>, GcodeError> {
        self.buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .map_err(|source| GcodeError::Io {
                path: self.path.to_path_buf(),
                line: self.line_number + 1,
                source,
            })?;

        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::io::{Cursor, Read};

    const PRUSA_HEADER: &str = "; generated by PrusaSlicer 2.6.1+linux-x64-GTK3 on 2023-10-01 at 18:21:44 UTC";

    fn parse_str(content: &str) -> Result<PrintMetadata, GcodeError> {
        GcodeParser::new("test.gcode").parse_reader(Cursor::new(content.as_bytes().to_vec()))
    }

    fn tiny_png_base64() -> String {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_pixel(1, 1, Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_prusa_key_values() {
        let content = format!(
            "{}\n\
             G28 ; home\n\
             ; estimated printing time (normal mode) = 2h 13m 5s\n\
             ; layer_height = 0.2\n\
             ; total filament used [g] = 12.34\n",
            PRUSA_HEADER
        );

        let metadata = parse_str(&content).unwrap();

        assert_eq!(metadata.gcode_type, Some(SlicerDialect::Prusa));
        assert_eq!(metadata.created_by.as_deref(), Some("PrusaSlicer 2.6.1+linux-x64-GTK3"));
        assert_eq!(metadata.created_date.as_deref(), Some("2023-10-01 18:21:44 UTC"));
        assert_eq!(metadata.total_time.as_deref(), Some("2h 13m 5s"));
        assert_eq!(metadata.layer_height.as_deref(), Some("0.2"));
        assert_eq!(metadata.filament_used_g.as_deref(), Some("12.34"));

        // Nothing else was present in the file
        assert_eq!(metadata.nozzle_diameter, None);
        assert_eq!(metadata.material, None);
        assert_eq!(metadata.filament_used_m, None);
        assert_eq!(metadata.printer_type, None);
        assert_eq!(metadata.thumbnail, None);
    }

    #[test]
    fn test_prusa_config_block_fields() {
        let content = format!(
            "{}\n\
             ; filament_type = PETG\n\
             ; nozzle_diameter = 0.4\n\
             ; filament used [mm] = 4012.55\n\
             ; printer_model = MK3S\n\
             ; some_unknown_key = whatever\n\
             ; a comment without separator\n",
            PRUSA_HEADER
        );

        let metadata = parse_str(&content).unwrap();
        assert_eq!(metadata.material.as_deref(), Some("PETG"));
        assert_eq!(metadata.nozzle_diameter.as_deref(), Some("0.4"));
        assert_eq!(metadata.filament_used_m.as_deref(), Some("4012.55"));
        assert_eq!(metadata.printer_type.as_deref(), Some("MK3S"));
    }

    #[test]
    fn test_prusa_thumbnail_is_extracted() {
        let b64 = tiny_png_base64();
        let (first, second) = b64.split_at(b64.len() / 2);
        let content = format!(
            "{}\n;\n; thumbnail begin 1x1 {}\n; {}\n; {}\n; thumbnail end\n;\n; layer_height = 0.15\n",
            PRUSA_HEADER,
            b64.len(),
            first,
            second
        );

        let metadata = parse_str(&content).unwrap();
        let thumbnail = metadata.thumbnail.expect("thumbnail should be decoded");
        assert!(thumbnail.starts_with("data:image/png;base64,"));
        assert_eq!(thumbnail, format!("data:image/png;base64,{}", b64));
        assert_eq!(metadata.layer_height.as_deref(), Some("0.15"));
    }

    #[test]
    fn test_bad_thumbnail_is_not_fatal() {
        let content = format!(
            "{}\n; thumbnail begin 16x16 12\n; !!!not-base64!!!\n; thumbnail end\n; layer_height = 0.3\n",
            PRUSA_HEADER
        );

        let metadata = parse_str(&content).unwrap();
        assert_eq!(metadata.thumbnail, None);
        assert_eq!(metadata.layer_height.as_deref(), Some("0.3"));
    }

    #[test]
    fn test_base64_that_is_not_png_is_rejected() {
        let payload = general_purpose::STANDARD.encode(b"GIF89a definitely not a png");
        assert!(matches!(decode_thumbnail(&payload), Err(ThumbnailError::Png(_))));
    }

    #[test]
    fn test_marlin_fields() {
        let content = ";FLAVOR:Marlin\n\
                       ;TIME:5400\n\
                       ;Filament used: 1.23456m\n\
                       ;Layer height: 0.12\n\
                       ;Generated with Cura_SteamEngine 5.4.0\n\
                       G28\n";

        let metadata = parse_str(content).unwrap();
        assert_eq!(metadata.gcode_type, Some(SlicerDialect::Marlin));
        assert_eq!(metadata.total_time.as_deref(), Some("1h30m0s"));
        assert_eq!(metadata.filament_used_m.as_deref(), Some("1.23456m"));
        assert_eq!(metadata.layer_height.as_deref(), Some("0.12"));
        assert_eq!(metadata.created_by.as_deref(), Some("Generated with Cura_SteamEngine 5.4.0"));
        assert_eq!(metadata.thumbnail, None);
    }

    #[test]
    fn test_marlin_non_numeric_time_is_skipped() {
        let metadata = parse_str(";FLAVOR:Marlin\n;TIME:soon\n;Layer height: 0.2\n").unwrap();
        assert_eq!(metadata.total_time, None);
        assert_eq!(metadata.layer_height.as_deref(), Some("0.2"));
    }

    #[test]
    fn test_unsupported_dialects() {
        for content in ["G28\n; generated by PrusaSlicer\n", ";Sliced by Simplify3D\n", ""] {
            match parse_str(content) {
                Err(GcodeError::UnsupportedDialect { .. }) => {}
                other => panic!("Expected UnsupportedDialect for {:?}, got {:?}", content, other),
            }
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = parse(Path::new("/nonexistent/print.gcode"));
        assert!(matches!(result, Err(GcodeError::Io { line: 0, .. })));
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.served {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"));
            }
            self.served = true;
            let header = b"; generated by PrusaSlicer 2.6.1\n";
            buf[..header.len()].copy_from_slice(header);
            Ok(header.len())
        }
    }

    #[test]
    fn test_read_error_reports_line_number() {
        let reader = BufReader::new(FailingReader { served: false });
        let result = GcodeParser::new("broken.gcode").parse_reader(reader);

        match result {
            Err(GcodeError::Io { path, line, .. }) => {
                assert_eq!(path, PathBuf::from("broken.gcode"));
                assert_eq!(line, 2);
            }
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8_is_tolerated() {
        let mut bytes = format!("{}\n", PRUSA_HEADER).into_bytes();
        bytes.extend_from_slice(b"; printer_model = MK\xff3\r\n");
        let metadata = GcodeParser::new("x.gcode").parse_reader(Cursor::new(bytes)).unwrap();
        assert!(metadata.printer_type.unwrap().starts_with("MK"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m5s");
        assert_eq!(format_duration(3600), "1h0m0s");
        assert_eq!(format_duration(5400), "1h30m0s");
    }

    #[test]
    fn test_detect_dialect() {
        assert_eq!(detect_dialect("; generated by PrusaSlicer 2.6"), Some(SlicerDialect::Prusa));
        assert_eq!(detect_dialect(";FLAVOR:Marlin"), Some(SlicerDialect::Marlin));
        assert_eq!(detect_dialect("FLAVOR:Marlin"), None);
        assert_eq!(detect_dialect("; generated by SuperSlicer"), None);
    }
}
