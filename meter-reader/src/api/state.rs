use std::sync::Arc;

use crate::config::Config;
use crate::drive::FileStore;
use crate::pipeline::ReadingPipeline;
use crate::vision::VisionBackendKind;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: ReadingPipeline,
    /// Backend behind the pipeline's classifier, for health reporting.
    pub vision_backend: VisionBackendKind,
    /// `None` when no service-account key could be loaded.
    pub drive: Option<Arc<dyn FileStore>>,
}

impl AppState {
    pub fn new(
        config: Config,
        pipeline: ReadingPipeline,
        vision_backend: VisionBackendKind,
        drive: Option<Arc<dyn FileStore>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
            vision_backend,
            drive,
        }
    }
}
