//! Terminal rendering of the session pairing code.

use qrcode::QrCode;
use qrcode::render::unicode;

/// Render `code` as a compact QR block, two modules per character cell.
pub fn render(code: &str) -> Result<String, qrcode::types::QrError> {
    let qr = QrCode::new(code.as_bytes())?;
    Ok(qr
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Print the pairing QR, or the raw code when it cannot be encoded.
pub fn print_code(code: &str) {
    match render(code) {
        Ok(qr) => {
            println!("\nScan with WhatsApp → Linked devices:\n");
            println!("{qr}");
        }
        Err(e) => {
            tracing::warn!("Could not render pairing QR: {e}");
            println!("Pairing code: {code}");
        }
    }
}
