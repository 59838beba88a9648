use std::sync::Arc;
use tonic::{Request, Response, Status};
use vidgate_core::generated::video_library_server::VideoLibrary;
use vidgate_core::generated::{ListVideosRequest, ListVideosResponse};
use vidgate_core::{library, IngestPipeline};

pub(crate) struct VideoLibraryService {
    pipeline: Arc<IngestPipeline>,
}

impl VideoLibraryService {
    pub(crate) fn new(pipeline: Arc<IngestPipeline>) -> Self {
        Self { pipeline }
    }
}

#[tonic::async_trait]
impl VideoLibrary for VideoLibraryService {
    async fn list_videos(
        &self,
        _request: Request<ListVideosRequest>,
    ) -> Result<Response<ListVideosResponse>, Status> {
        let settings = self.pipeline.settings();
        let storage_dir = settings.storage_dir.clone();
        let base_url = settings.public_base_url.clone();

        let videos =
            tokio::task::spawn_blocking(move || library::list_videos(&storage_dir, &base_url))
                .await
                .map_err(|err| Status::internal(format!("listing task failed: {}", err)))?;

        Ok(Response::new(ListVideosResponse { videos }))
    }
}
