use std::io::Cursor;
use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use kurbo::{Affine, Point};
use tiny_skia::{
    FillRule, FilterQuality, IntSize, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint,
    Stroke, Transform,
};
use crate::objects::{ObjectData, SceneObject};
use crate::types::Rgba8;
use crate::error::{EngineError, Result};

pub fn new_pixmap(width: u32, height: u32) -> Result<Pixmap> {
    Pixmap::new(width.max(1), height.max(1))
        .ok_or_else(|| EngineError::Raster(format!("cannot allocate {}x{} pixmap", width, height)))
}

pub fn affine_to_skia(xf: Affine) -> Transform {
    let [a, b, c, d, e, f] = xf.as_coeffs();
    Transform::from_row(a as f32, b as f32, c as f32, d as f32, e as f32, f as f32)
}

fn premultiply_rgba_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

pub fn rgba_to_pixmap(image: RgbaImage) -> Result<Pixmap> {
    let (width, height) = image.dimensions();
    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| EngineError::Raster(format!("invalid image size {}x{}", width, height)))?;
    let mut rgba = image.into_raw();
    premultiply_rgba_in_place(&mut rgba);
    Pixmap::from_vec(rgba, size).ok_or_else(|| EngineError::Raster("pixel buffer size mismatch".into()))
}

pub fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let mut out = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in out.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        dst.0 = [c.red(), c.green(), c.blue(), c.alpha()];
    }
    out
}

pub fn decode_image(bytes: &[u8]) -> Result<Pixmap> {
    let img = image::load_from_memory(bytes)?;
    rgba_to_pixmap(img.to_rgba8())
}

pub fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    let raw = match payload.find(";base64,") {
        Some(idx) => &payload[idx + ";base64,".len()..],
        None => payload,
    };
    Ok(general_purpose::STANDARD.decode(raw.trim())?)
}

/// Decodes a `data:` URL or a bare base64 string.
pub fn decode_data_url(src: &str) -> Result<Pixmap> {
    decode_image(&decode_base64(src)?)
}

pub fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>> {
    let img = DynamicImage::ImageRgba8(pixmap_to_rgba(pixmap));
    let mut png_bytes: Vec<u8> = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_bytes), ImageOutputFormat::Png)?;
    Ok(png_bytes)
}

pub fn png_data_url(png_bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png_bytes))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn is_transparent(pixmap: &Pixmap) -> bool {
    pixmap.pixels().iter().all(|p| p.alpha() == 0)
}

pub fn alpha_at(pixmap: &Pixmap, x: u32, y: u32) -> u8 {
    pixmap.pixel(x, y).map(|p| p.alpha()).unwrap_or(0)
}

/// Stretches `source` over the whole of `target`.
pub fn draw_stretched(target: &mut Pixmap, source: &Pixmap) {
    let sx = target.width() as f32 / source.width() as f32;
    let sy = target.height() as f32 / source.height() as f32;
    let paint = PixmapPaint { quality: FilterQuality::Bilinear, ..PixmapPaint::default() };
    target.draw_pixmap(0, 0, source.as_ref(), &paint, Transform::from_scale(sx, sy), None);
}

fn solid_paint(color: Rgba8, opacity: f64) -> Paint<'static> {
    let mut c = color.to_skia();
    c.set_alpha(c.alpha() * opacity.clamp(0.0, 1.0) as f32);
    let mut paint = Paint::default();
    paint.set_color(c);
    paint.anti_alias = true;
    paint
}

/// Strokes a polyline with round caps and joins. A polyline that collapses
/// to one point is drawn as a dot.
pub fn stroke_polyline(target: &mut Pixmap, points: &[Point], width: f64, color: Rgba8, opacity: f64, xf: Affine) {
    let Some(first) = points.first() else { return; };
    let paint = solid_paint(color, opacity);
    let degenerate = points.iter().all(|p| p == first);
    if degenerate {
        if let Some(dot) = PathBuilder::from_circle(first.x as f32, first.y as f32, (width / 2.0).max(0.5) as f32) {
            target.fill_path(&dot, &paint, FillRule::Winding, affine_to_skia(xf), None);
        }
        return;
    }
    let mut pb = PathBuilder::new();
    pb.move_to(first.x as f32, first.y as f32);
    for p in &points[1..] {
        pb.line_to(p.x as f32, p.y as f32);
    }
    let Some(path) = pb.finish() else { return; };
    let stroke = Stroke {
        width: width.max(0.0) as f32,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    target.stroke_path(&path, &paint, &stroke, affine_to_skia(xf), None);
}

/// Draws `obj` into `target`, with `base` mapping scene space to target
/// pixels. Text has no raster form here and is skipped.
pub fn draw_object(target: &mut Pixmap, obj: &SceneObject, base: Affine) -> Result<()> {
    if !obj.visible { return Ok(()); }
    let xf = base * obj.transform();
    match &obj.data {
        ObjectData::Image { src } => {
            let pixels = decode_data_url(src)?;
            let local = xf
                * Affine::translate((-obj.width / 2.0, -obj.height / 2.0))
                * Affine::scale_non_uniform(obj.width / pixels.width() as f64, obj.height / pixels.height() as f64);
            let paint = PixmapPaint {
                opacity: obj.opacity.clamp(0.0, 1.0) as f32,
                quality: FilterQuality::Bilinear,
                ..PixmapPaint::default()
            };
            target.draw_pixmap(0, 0, pixels.as_ref(), &paint, affine_to_skia(local), None);
        }
        ObjectData::Path { points, stroke, stroke_width } => {
            stroke_polyline(target, points, *stroke_width, Rgba8::parse(stroke), obj.opacity, xf);
        }
        ObjectData::Rect { fill, stroke, stroke_width } => {
            let Some(rect) = tiny_skia::Rect::from_xywh(
                (-obj.width / 2.0) as f32, (-obj.height / 2.0) as f32, obj.width as f32, obj.height as f32,
            ) else { return Ok(()); };
            let fill = Rgba8::parse(fill);
            if fill.a > 0 {
                target.fill_rect(rect, &solid_paint(fill, obj.opacity), affine_to_skia(xf), None);
            }
            let stroke_color = Rgba8::parse(stroke);
            if *stroke_width > 0.0 && stroke_color.a > 0 {
                let path = PathBuilder::from_rect(rect);
                let stroke = Stroke { width: *stroke_width as f32, ..Stroke::default() };
                target.stroke_path(&path, &solid_paint(stroke_color, obj.opacity), &stroke, affine_to_skia(xf), None);
            }
        }
        ObjectData::Group { children } => {
            for child in children {
                draw_object(target, child, xf)?;
            }
        }
        ObjectData::Text { .. } => {
            tracing::debug!(id = obj.id, "text objects are not rasterized");
        }
    }
    Ok(())
}
