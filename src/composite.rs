//! Flattens the cels of one frame onto a canvas-sized RGBA buffer.

use log::trace;
use rgb::RGBA8;

use crate::blend::{blend, combine};
use crate::document::Document;
use crate::error::{AsepriteError, Result};

/// Composites frame `frame_index` of `document`, bottom cel first.
///
/// With `only_visible` set, cels on hidden layers are skipped. Tilemap cels
/// are never drawn. Cel pixels outside the canvas are dropped.
pub fn composite(document: &Document, frame_index: usize, only_visible: bool) -> Result<Vec<RGBA8>> {
    let frame = document
        .frames
        .get(frame_index)
        .ok_or(AsepriteError::Index {
            what: "frame",
            index: frame_index,
            len: document.frames.len(),
        })?;

    let width = i32::from(document.width);
    let height = i32::from(document.height);
    let mut canvas = vec![RGBA8::new(0, 0, 0, 0); document.width as usize * document.height as usize];

    for cel in &frame.cels {
        let layer_index = usize::from(cel.layer_index);
        let layer = document.layers.get(layer_index).ok_or(AsepriteError::Index {
            what: "layer",
            index: layer_index,
            len: document.layers.len(),
        })?;
        let Some(image) = cel.image() else {
            continue;
        };
        if only_visible && !layer.is_visible() {
            continue;
        }

        let layer_opacity = if document.layer_opacity_valid {
            layer.opacity
        } else {
            255
        };
        let opacity = combine(cel.opacity, layer_opacity);
        trace!(
            "frame {}: drawing {}x{} cel of layer {:?} at ({}, {}) with {:?}",
            frame_index,
            image.width,
            image.height,
            layer.name,
            cel.x,
            cel.y,
            layer.blend_mode
        );

        let cel_width = usize::from(image.width).max(1);
        for (i, &source) in image.pixels.iter().enumerate() {
            let x = (i % cel_width) as i32 + i32::from(cel.x);
            let y = (i / cel_width) as i32 + i32::from(cel.y);
            if x < 0 || x >= width || y < 0 || y >= height {
                continue;
            }
            let target = &mut canvas[(y * width + x) as usize];
            *target = blend(layer.blend_mode, *target, source, opacity);
        }
    }
    Ok(canvas)
}
