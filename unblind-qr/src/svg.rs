use crate::{QrCode, QrError};

/// Renders `qr` as an SVG document with `border` light modules on every side.
///
/// Each dark module becomes a unit square in a single `<path>`, drawn in
/// `dark` over a full-size `light` background rectangle. The view box is
/// `size + 2 * border` modules square. Output always uses `\n` line endings.
///
/// # Errors
///
/// [`QrError::BorderOutOfRange`] when `border` is negative.
pub fn to_svg_string(qr: &QrCode, border: i32, light: &str, dark: &str) -> Result<String, QrError> {
    if border < 0 {
        return Err(QrError::BorderOutOfRange(border));
    }
    let border = border as usize;

    let mut parts = Vec::new();
    for y in 0..qr.size() {
        for x in 0..qr.size() {
            if qr.module(x, y) {
                parts.push(format!("M{},{}h1v1h-1z", x + border, y + border));
            }
        }
    }

    let dimension = qr.size() + border * 2;
    let path = parts.join(" ");

    Ok(format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" \"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\">\n\
         <svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" viewBox=\"0 0 {dimension} {dimension}\" stroke=\"none\">\n\
         \t<rect width=\"100%\" height=\"100%\" fill=\"{light}\"/>\n\
         \t<path d=\"{path}\" fill=\"{dark}\"/>\n\
         </svg>\n"
    ))
}
