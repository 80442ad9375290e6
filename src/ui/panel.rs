/// Controls, display surface and prediction list
use iced::widget::image::Image;
use iced::widget::{button, canvas, column, container, row, stack, text, Column};
use iced::{Alignment, Color, ContentFit, Element, Length, Size};

use super::overlay::{Overlay, Scale};
use crate::state::session::Session;
use crate::Message;

const ACCENT: Color = Color {
    r: 1.0,
    g: 0.7,
    b: 0.0,
    a: 1.0,
};
const CONNECTED: Color = Color {
    r: 0.0,
    g: 1.0,
    b: 0.56,
    a: 1.0,
};

/// Button row: upload, start/stop webcam, predict
///
/// Invalid actions are disabled rather than rejected.
pub fn controls(session: &Session) -> Element<'_, Message> {
    let upload = button("Upload Image")
        .on_press(Message::UploadImage)
        .padding(10);

    let webcam = if session.is_live() {
        button("Stop Webcam")
            .on_press(Message::StopWebcam)
            .style(button::danger)
            .padding(10)
    } else if session.camera_pending() {
        button("Starting Webcam...").style(button::success).padding(10)
    } else {
        button("Start Webcam")
            .on_press(Message::StartWebcam)
            .style(button::success)
            .padding(10)
    };

    let predict = button(session.predict_label())
        .on_press_maybe(session.can_predict().then_some(Message::Predict))
        .padding(10);

    let mut controls = row![upload, webcam, predict]
        .spacing(16)
        .align_y(Alignment::Center);

    if session.is_live() && session.channel_ready() {
        controls = controls.push(text("WebSocket Connected").color(CONNECTED));
    }

    controls.into()
}

/// Photo or video with the detection overlay on top
pub fn surface(session: &Session, display: Size) -> Element<'_, Message> {
    let width = Length::Fixed(display.width);
    let height = Length::Fixed(display.height);

    let Some(handle) = session.display_handle() else {
        let placeholder = if session.is_live() {
            "Waiting for camera..."
        } else {
            "Upload an image or start the webcam"
        };
        return container(text(placeholder))
            .width(width)
            .height(height)
            .center_x(width)
            .center_y(height)
            .into();
    };

    // Fill, so the on-screen size is exactly the display size the scale assumes
    let picture = Image::new(handle.clone())
        .width(width)
        .height(height)
        .content_fit(ContentFit::Fill);

    let overlay = canvas(Overlay {
        predictions: session.predictions(),
        scale: Scale::fit(display, session.natural_size()),
    })
    .width(width)
    .height(height);

    stack![picture, overlay].into()
}

/// Loading indicator, prediction list and the save action
pub fn results(session: &Session) -> Element<'_, Message> {
    let mut panel: Column<Message> = column![].spacing(8).width(Length::Fixed(260.0));

    if session.is_loading() {
        panel = panel.push(text("Predicting...").color(ACCENT));
    }

    if !session.predictions().is_empty() {
        panel = panel.push(text("Predictions").size(20));
        for prediction in session.predictions() {
            panel = panel.push(text(prediction.label()).size(16));
        }
    }

    if session.can_save() {
        panel = panel.push(
            button("Save to Database")
                .on_press(Message::SaveToDatabase)
                .padding(10),
        );
    }

    panel.into()
}
