//! 조인 URL QR 코드
//!
//! 일부가 가려져도 읽히도록 오류 정정 레벨 H 를 쓴다.

use qrcode::render::{svg, unicode};
use qrcode::types::QrError;
use qrcode::{EcLevel, QrCode};

const SVG_MIN_SIZE: u32 = 256;

fn encode(url: &str) -> Result<QrCode, QrError> {
    QrCode::with_error_correction_level(url.as_bytes(), EcLevel::H)
}

/// 호스트 화면용 SVG
pub fn render_svg(url: &str) -> Result<String, QrError> {
    let code = encode(url)?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(SVG_MIN_SIZE, SVG_MIN_SIZE)
        .quiet_zone(true)
        .build())
}

/// 터미널 로그용
pub fn render_terminal(url: &str) -> Result<String, QrError> {
    let code = encode(url)?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}
