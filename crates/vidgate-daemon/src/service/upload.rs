use std::sync::Arc;
use tonic::{Request, Response, Status, Streaming};
use vidgate_core::generated::video_upload_server::VideoUpload;
use vidgate_core::generated::{UploadRequest, UploadResponse};
use vidgate_core::IngestPipeline;

/// gRPC face of the ingest pipeline. All upload semantics live in
/// [`IngestPipeline::handle_upload`]; failures surface as response values,
/// never as `Status` errors.
pub(crate) struct VideoUploadService {
    pipeline: Arc<IngestPipeline>,
}

impl VideoUploadService {
    pub(crate) fn new(pipeline: Arc<IngestPipeline>) -> Self {
        Self { pipeline }
    }
}

#[tonic::async_trait]
impl VideoUpload for VideoUploadService {
    async fn upload_video(
        &self,
        request: Request<Streaming<UploadRequest>>,
    ) -> Result<Response<UploadResponse>, Status> {
        let stream = request.into_inner();
        Ok(Response::new(self.pipeline.handle_upload(stream).await))
    }
}
