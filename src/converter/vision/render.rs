//! Rasterise every page of an in-memory PDF with pdfium.
//!
//! pdfium is not async-safe and rendering is CPU-bound, so the whole pass runs
//! on the blocking pool. The library is bound once per document.

use super::{VisionConfig, MAX_RENDERED_PIXELS};
use crate::error::ConverterError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Render all pages, returning `(page_index_0based, image)` in page order.
pub(super) async fn render_pages(
    pdf: Vec<u8>,
    config: &VisionConfig,
) -> Result<Vec<(usize, DynamicImage)>, ConverterError> {
    let max_pixels = config.max_rendered_pixels;
    let library = config.pdfium_library_path.clone();

    tokio::task::spawn_blocking(move || render_blocking(pdf, library.as_deref(), max_pixels))
        .await
        .map_err(|e| ConverterError::Internal(format!("render task panicked: {e}")))?
}

fn render_blocking(
    pdf: Vec<u8>,
    library: Option<&Path>,
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, ConverterError> {
    let pdfium = bind_pdfium(library)?;
    let document = pdfium
        .load_pdf_from_byte_vec(pdf, None)
        .map_err(|e| ConverterError::Unreadable {
            format: "PDF".into(),
            detail: format!("{e:?}"),
        })?;

    let edge = render_edge(max_pixels);
    let render_config = PdfRenderConfig::new()
        .set_target_width(edge)
        .set_maximum_height(edge);

    let mut images = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ConverterError::Pdf(format!("page {}: {e:?}", idx + 1)))?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
        images.push((idx, image));
    }
    Ok(images)
}

fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, ConverterError> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(library_file(path)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ConverterError::Pdf(format!("failed to bind pdfium library: {e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Accept either the library file itself or the directory containing it.
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

/// Config fields are public, so the builder's clamp may have been bypassed.
fn render_edge(max_pixels: u32) -> i32 {
    max_pixels.clamp(100, MAX_RENDERED_PIXELS) as i32
}
