use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use llmux::models::message::Message;
use std::path::Path;

fn media_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Attach an image file to a message as base64 data
pub fn with_image_file(message: Message, path: &Path) -> Result<Message> {
    let Some(media_type) = media_type(path) else {
        bail!(
            "Unsupported image type for {}, expected png, jpeg, gif or webp",
            path.display()
        );
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    Ok(message.with_image(STANDARD.encode(bytes), media_type))
}

/// The user's turn: the prompt text followed by any images
pub fn user_message(text: &str, images: &[impl AsRef<Path>]) -> Result<Message> {
    let mut message = Message::user();
    if !text.trim().is_empty() {
        message = message.with_text(text.trim());
    }
    for path in images {
        message = with_image_file(message, path.as_ref())?;
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmux::models::content::{ContentBlock, ImageSource};
    use std::io::Write;

    #[test]
    fn test_user_message_with_image() {
        let mut file = tempfile::Builder::new().suffix(".PNG").tempfile().unwrap();
        file.write_all(b"hi").unwrap();

        let message = user_message(" What is this? ", &[file.path()]).unwrap();
        assert_eq!(message.content[0], ContentBlock::text("What is this?"));
        assert_eq!(
            message.content[1],
            ContentBlock::Image {
                source: ImageSource::Base64 {
                    media_type: "image/png".to_string(),
                    data: "aGk=".to_string(),
                }
            }
        );
    }

    #[test]
    fn test_unknown_image_type() {
        let file = tempfile::Builder::new().suffix(".bmp").tempfile().unwrap();
        let err = user_message("", &[file.path()]).unwrap_err();
        assert!(err.to_string().starts_with("Unsupported image type"));
    }

    #[test]
    fn test_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let err = user_message("hi", &[dir.path().join("cat.jpg")]).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read image"));
    }
}
