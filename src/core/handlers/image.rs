use super::{ContentHandler, HandlerOutcome, TrxContext};
use crate::storage::StoreTransaction;
use crate::types::content::ImagePayload;
use crate::types::models::Image;
use crate::utils::error::{Result, RumIndexerError};
use async_trait::async_trait;

/// Stores the images of a transaction, keyed by its trx id and list position.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageHandler;

#[async_trait]
impl ContentHandler<ImagePayload> for ImageHandler {
    async fn apply(
        &self,
        payload: &ImagePayload,
        ctx: &TrxContext<'_>,
        tx: &mut dyn StoreTransaction,
    ) -> Result<HandlerOutcome> {
        let images = payload
            .images
            .iter()
            .enumerate()
            .map(|(index, image)| {
                Ok(Image {
                    trx_id: ctx.trx_id().to_string(),
                    group_id: ctx.group_id.to_string(),
                    position: image_position(index)?,
                    name: image.name.clone(),
                    media_type: image.media_type.clone(),
                    content: image.content.clone(),
                    user_address: ctx.actor().to_string(),
                    timestamp: ctx.timestamp(),
                })
            })
            .collect::<Result<Vec<Image>>>()?;
        tx.insert_images(&images).await?;
        Ok(HandlerOutcome::applied())
    }
}

/// The `position` column is an INT4.
fn image_position(index: usize) -> Result<i32> {
    i32::try_from(index)
        .map_err(|_| RumIndexerError::HandlerError(format!("image index {index} overflows position")))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{apply, item};
    use super::image_position;
    use crate::config::DeletePolicy;
    use crate::storage::{MemoryStorage, StorageBackend};
    use serde_json::json;

    #[tokio::test]
    async fn test_images_keep_their_order() {
        let storage = MemoryStorage::new();
        let upload = item(
            "i1",
            "alice",
            json!({"type": "image", "images": [
                {"name": "a.png", "mediaType": "image/png", "content": "AAAA"},
                {"mediaType": "image/jpeg", "content": "BBBB"}
            ]}),
        );
        apply(&storage, &upload, DeletePolicy::Permissive).await;

        let mut tx = storage.begin().await.unwrap();
        let images = tx.list_images("g", "i1").await.unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].name.as_deref(), Some("a.png"));
        assert_eq!(images[1].media_type, "image/jpeg");
        assert_eq!(images[1].position, 1);
    }

    #[test]
    fn test_position_out_of_column_range_is_rejected() {
        assert_eq!(image_position(7).unwrap(), 7);
        assert_eq!(image_position(i32::MAX as usize).unwrap(), i32::MAX);
        let err = image_position(i32::MAX as usize + 1).unwrap_err();
        assert!(err.is_poison());
    }
}
