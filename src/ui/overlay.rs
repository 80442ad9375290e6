/// Detection overlay
/// Draws bounding boxes and class labels over the image/video surface
use iced::alignment::Vertical;
use iced::widget::canvas::{self, Path, Stroke, Text};
use iced::{Color, Pixels, Point, Rectangle, Size};

use crate::state::data::Prediction;
use crate::Message;

/// Box and label color (#00FF00)
const BOX_COLOR: Color = Color {
    r: 0.0,
    g: 1.0,
    b: 0.0,
    a: 1.0,
};
const STROKE_WIDTH: f32 = 2.0;
const LABEL_SIZE: f32 = 16.0;

/// Labels move below the top edge of the box when closer than this to the
/// top of the canvas
const LABEL_CLEARANCE: f32 = 20.0;
const LABEL_GAP: f32 = 5.0;

/// Source-pixel to canvas-pixel factors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub x: f32,
    pub y: f32,
}

impl Scale {
    pub const IDENTITY: Scale = Scale { x: 1.0, y: 1.0 };

    /// displayed size ÷ natural size, per axis
    pub fn fit(display: Size, natural: Option<(u32, u32)>) -> Self {
        match natural {
            Some((width, height)) if width > 0 && height > 0 => Self {
                x: display.width / width as f32,
                y: display.height / height as f32,
            },
            _ => Self::IDENTITY,
        }
    }
}

/// One box as it lands on the canvas
#[derive(Debug, Clone, PartialEq)]
pub struct BoxShape {
    pub origin: Point,
    pub size: Size,
    pub label: String,
    /// Bottom-left corner of the label text
    pub label_at: Point,
}

/// Canvas geometry for a prediction set
pub fn layout(predictions: &[Prediction], scale: Scale) -> Vec<BoxShape> {
    predictions
        .iter()
        .map(|prediction| {
            // Canvas space is f32
            let [x1, y1, x2, y2] = prediction.bbox.map(|v| v as f32);
            let left = x1 * scale.x;
            let top = y1 * scale.y;

            let label_y = if top > LABEL_CLEARANCE {
                top - LABEL_GAP
            } else {
                top + LABEL_CLEARANCE
            };

            BoxShape {
                origin: Point::new(left, top),
                size: Size::new((x2 - x1) * scale.x, (y2 - y1) * scale.y),
                label: prediction.class.clone(),
                label_at: Point::new(left, label_y),
            }
        })
        .collect()
}

/// Canvas program for the current predictions
///
/// Rebuilt on every view pass, so it always reflects the latest source,
/// predictions and mode.
pub struct Overlay<'a> {
    pub predictions: &'a [Prediction],
    pub scale: Scale,
}

impl canvas::Program<Message> for Overlay<'_> {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &iced::Renderer,
        _theme: &iced::Theme,
        bounds: Rectangle,
        _cursor: iced::mouse::Cursor,
    ) -> Vec<canvas::Geometry> {
        // A fresh frame starts out cleared
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        for shape in layout(self.predictions, self.scale) {
            frame.stroke(
                &Path::rectangle(shape.origin, shape.size),
                Stroke::default()
                    .with_color(BOX_COLOR)
                    .with_width(STROKE_WIDTH),
            );
            frame.fill_text(Text {
                content: shape.label,
                position: shape.label_at,
                color: BOX_COLOR,
                size: Pixels(LABEL_SIZE),
                vertical_alignment: Vertical::Bottom,
                ..Text::default()
            });
        }

        vec![frame.into_geometry()]
    }
}
