//! Page rasterisation via pdfium and PNG/base64 encoding for the vision API.
//!
//! pdfium is a blocking C++ library, so callers run [`render_first_page`] on
//! the blocking pool. The longest edge is capped at `max_pixels` whatever the
//! physical page size.
//!
//! Creating a [`Pdfium`] initialises process-wide library state and dropping
//! it tears that state down, so one instance is bound per engine and shared
//! by every render.

use crate::error::ConversionError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Bind to pdfium: the explicit library path if given, else a library next
/// to the executable's working directory, else the system library.
pub fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, String> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    };
    bindings.map(Pdfium::new).map_err(|e| format!("{e:?}"))
}

/// Rasterise page 1 of a single-page artifact.
pub fn render_first_page(
    pdfium: &Pdfium,
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
) -> Result<DynamicImage, ConversionError> {
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| ConversionError::Rejected(format!("pdfium could not open page: {e:?}")))?;

    let page = document
        .pages()
        .get(0)
        .map_err(|e| ConversionError::Rejected(format!("page missing: {e:?}")))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ConversionError::Rejected(format!("rasterisation failed: {e:?}")))?;

    let image = bitmap.as_image();
    debug!(
        "Rendered {} → {}x{} px",
        pdf_path.display(),
        image.width(),
        image.height()
    );
    Ok(image)
}

/// Encode a rendered page as a lossless base64 PNG attachment.
pub fn encode_png(img: &DynamicImage) -> Result<ImageData, ConversionError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ConversionError::Rejected(format!("PNG encoding failed: {e}")))?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encodes_a_png_attachment() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 4, Rgba([0, 0, 0, 255])));
        let data = encode_png(&img).unwrap();
        assert_eq!(data.mime_type, "image/png");

        let bytes = STANDARD.decode(&data.data).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn missing_library_path_is_reported() {
        let err = bind_pdfium(Some(Path::new("/nonexistent/libpdfium.so"))).unwrap_err();
        assert!(!err.is_empty());
    }
}
