use serde::{Serialize, Deserialize};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum ShapeType {
    Image,
    Path,
    Group,
    Rect,
    Text,
}

/// Per-object tag that splits image layers into the fixed (background) and
/// movable (foreground) request artifacts.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Unset,
    Fixed,
    Modify,
}

impl ViewMode {
    pub fn is_fixed(self) -> bool {
        self == ViewMode::Fixed
    }

    pub fn parse(value: &str) -> Option<ViewMode> {
        match value {
            "fixed" => Some(ViewMode::Fixed),
            "modify" => Some(ViewMode::Modify),
            "" | "unset" => Some(ViewMode::Unset),
            _ => None,
        }
    }
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct AspectRatio {
    pub name: &'static str,
    pub ratio_width: u32,
    pub ratio_height: u32,
    pub output_width: u32,
    pub output_height: u32,
}

pub const ASPECT_RATIOS: [AspectRatio; 7] = [
    AspectRatio { name: "1:1", ratio_width: 1, ratio_height: 1, output_width: 1024, output_height: 1024 },
    AspectRatio { name: "4:3", ratio_width: 4, ratio_height: 3, output_width: 1152, output_height: 896 },
    AspectRatio { name: "3:4", ratio_width: 3, ratio_height: 4, output_width: 896, output_height: 1152 },
    AspectRatio { name: "3:2", ratio_width: 3, ratio_height: 2, output_width: 1216, output_height: 832 },
    AspectRatio { name: "2:3", ratio_width: 2, ratio_height: 3, output_width: 832, output_height: 1216 },
    AspectRatio { name: "16:9", ratio_width: 16, ratio_height: 9, output_width: 1344, output_height: 768 },
    AspectRatio { name: "9:16", ratio_width: 9, ratio_height: 16, output_width: 768, output_height: 1344 },
];

pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

impl AspectRatio {
    pub fn lookup(name: &str) -> Option<AspectRatio> {
        ASPECT_RATIOS.iter().copied().find(|r| r.name == name)
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.output_width, self.output_height)
    }
}

/// Viewport size in CSS pixels at the moment a snapshot was taken.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct ViewportFrame {
    pub width: f64,
    pub height: f64,
}

impl Default for ViewportFrame {
    fn default() -> Self {
        ViewportFrame { width: 1024.0, height: 1024.0 }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Rgba8 = Rgba8 { r: 255, g: 255, b: 255, a: 255 };
    pub const BLACK: Rgba8 = Rgba8 { r: 0, g: 0, b: 0, a: 255 };

    /// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa` and `transparent`. Anything
    /// else resolves to opaque black.
    pub fn parse(color: &str) -> Rgba8 {
        if color == "transparent" || color.is_empty() { return Rgba8 { r: 0, g: 0, b: 0, a: 0 }; }
        let hex = color.trim_start_matches('#');
        match hex.len() {
            8 => {
                if let Ok(c) = u32::from_str_radix(hex, 16) {
                    return Rgba8 { r: (c >> 24) as u8, g: (c >> 16) as u8, b: (c >> 8) as u8, a: c as u8 };
                }
            }
            6 => {
                if let Ok(c) = u32::from_str_radix(hex, 16) {
                    return Rgba8 { r: (c >> 16) as u8, g: (c >> 8) as u8, b: c as u8, a: 255 };
                }
            }
            3 => {
                if let Ok(c) = u16::from_str_radix(hex, 16) {
                    let r = ((c >> 8) & 0xf) as u8;
                    let g = ((c >> 4) & 0xf) as u8;
                    let b = (c & 0xf) as u8;
                    return Rgba8 { r: r | (r << 4), g: g | (g << 4), b: b | (b << 4), a: 255 };
                }
            }
            _ => {}
        }
        Rgba8::BLACK
    }

    pub fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}
