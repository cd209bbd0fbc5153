use base64::Engine as _;

use crate::errors::EyeHandResult;

/// Most-recent captured frame. The source keeps only the latest image;
/// there is no back-pressure and no frame queue.
#[derive(Clone)]
pub struct Frame {
    pub image: image::DynamicImage,
}

/// Seam to the capture side (camera / stream grabber). Non-blocking:
/// returns the latest frame or `None` if nothing has been captured yet.
pub trait FrameSource: Send + Sync {
    fn latest_frame(&self) -> Option<Frame>;
}

impl Frame {
    /// Lossy JPEG encode wrapped as a data URL for the chat-completion
    /// image_url content part.
    pub fn to_data_url(&self) -> EyeHandResult<String> {
        let mut jpeg = Vec::new();
        self.image.write_to(
            &mut std::io::Cursor::new(&mut jpeg),
            image::ImageFormat::Jpeg,
        )?;
        let b64 = base64::engine::general_purpose::STANDARD.encode(&jpeg);
        Ok(format!("data:image/jpeg;base64,{b64}"))
    }
}
