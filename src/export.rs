//! Print and export: the coloring book as files on disk.
//!
//! Two outputs are produced from a [`Gallery`]:
//!
//! * one image file per converted page (`page-001.png`, `page-002.png`, ...)
//! * a self-contained HTML print document with the pages embedded as data
//!   URIs, one per printed sheet, ready for a browser's print-to-PDF
//!
//! Every file is written to a temp file in the destination directory and then
//! renamed into place, so an interrupted export never leaves a half-written
//! page behind.

use crate::config::PageSize;
use crate::error::ColoringError;
use crate::gallery::Gallery;
use crate::pipeline::encode::EncodedImage;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Render the gallery as an HTML document sized for `page`.
pub fn print_document(gallery: &Gallery, title: &str, page: PageSize) -> String {
    let mut html = String::with_capacity(1024 + gallery.items().iter().map(|i| i.converted.data.len() + 64).sum::<usize>());
    let title = escape_html(title);

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "<title>{title}</title>");
    html.push_str("<style>\n");
    let _ = writeln!(html, "@page {{ size: {}in {}in; margin: 0.25in; }}", page.width_in, page.height_in);
    html.push_str(
        "body { margin: 0; }\n\
         .page { display: flex; align-items: center; justify-content: center; page-break-after: always; break-after: page; }\n\
         .page:last-child { page-break-after: auto; break-after: auto; }\n\
         img { max-width: 100%; max-height: 100vh; height: auto; }\n\
         @media print {\n  body { -webkit-print-color-adjust: exact; print-color-adjust: exact; }\n  img { page-break-inside: avoid; break-inside: avoid; }\n}\n",
    );
    html.push_str("</style>\n</head>\n<body>\n");
    for (i, item) in gallery.items().iter().enumerate() {
        let _ = writeln!(
            html,
            "<div class=\"page\"><img src=\"{}\" alt=\"{} page {}\"></div>",
            item.converted.to_data_uri(),
            title,
            i + 1
        );
    }
    html.push_str("</body>\n</html>\n");
    html
}

/// Write every converted page into `dir` as `page-NNN.<ext>`.
pub fn write_pages(gallery: &Gallery, dir: &Path) -> Result<Vec<PathBuf>, ColoringError> {
    let converted: Vec<&EncodedImage> = gallery.items().iter().map(|item| &item.converted).collect();
    write_images(&converted, dir, "page")
}

/// Write images into `dir` as `<prefix>-NNN.<ext>`, numbered from 1.
pub fn write_images(images: &[&EncodedImage], dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, ColoringError> {
    if images.is_empty() {
        return Err(ColoringError::NoImages);
    }
    create_dir(dir)?;

    let mut written = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        let path = dir.join(format!("{}-{:03}.{}", prefix, i + 1, image.extension()));
        let bytes = image.decode_bytes()?;
        write_atomic(&path, &bytes)?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        written.push(path);
    }
    info!("Wrote {} images to {}", written.len(), dir.display());
    Ok(written)
}

/// Write the HTML print document to `path`.
pub fn write_print_document(
    gallery: &Gallery,
    title: &str,
    page: PageSize,
    path: &Path,
) -> Result<(), ColoringError> {
    if gallery.is_empty() {
        return Err(ColoringError::NoImages);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(parent)?;
    }
    write_atomic(path, print_document(gallery, title, page).as_bytes())?;
    info!("Wrote print document {}", path.display());
    Ok(())
}

fn create_dir(dir: &Path) -> Result<(), ColoringError> {
    std::fs::create_dir_all(dir).map_err(|e| ColoringError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source: e,
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ColoringError> {
    let fail = |source: std::io::Error| ColoringError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
