use chrono::NaiveDate;
use rollcall_core::{
    ArcFaceExtractor, AttendanceError, AttendanceReport, BatchAttendance, BatchIdentifier,
    DirectoryStore, EnrollmentManager, EnrollmentRecord, EuclideanMatcher, ExtractionError,
    FaceLocator, FacePipeline, ImageInput, LocatorError, PopulationFilter, ScrfdLocator,
    SignatureExtractor, Verification, Verifier,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("locator model: {0}")]
    Locator(#[from] LocatorError),
    #[error("extractor model: {0}")]
    Extractor(#[from] ExtractionError),
    #[error(transparent)]
    Attendance(#[from] AttendanceError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from the CLI to the engine thread.
enum EngineRequest {
    Enroll {
        student_id: String,
        image: ImageInput,
        reply: oneshot::Sender<Result<EnrollmentRecord, AttendanceError>>,
    },
    Verify {
        student_id: String,
        image: ImageInput,
        reply: oneshot::Sender<Result<Verification, AttendanceError>>,
    },
    MarkPresent {
        filter: PopulationFilter,
        subject_id: String,
        date: NaiveDate,
        images: Vec<ImageInput>,
        reply: oneshot::Sender<Result<AttendanceReport, AttendanceError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enroll the first face in `image` for `student_id`.
    pub async fn enroll(
        &self,
        student_id: String,
        image: ImageInput,
    ) -> Result<EnrollmentRecord, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineRequest::Enroll {
            student_id,
            image,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub async fn verify(
        &self,
        student_id: String,
        image: ImageInput,
    ) -> Result<Verification, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineRequest::Verify {
            student_id,
            image,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Identify a class across `images` and record everyone found.
    pub async fn mark_present(
        &self,
        filter: PopulationFilter,
        subject_id: String,
        date: NaiveDate,
        images: Vec<ImageInput>,
    ) -> Result<AttendanceReport, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.request(EngineRequest::MarkPresent {
            filter,
            subject_id,
            date,
            images,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    async fn request(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx
            .send(req)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Load both ONNX models named by `config`. Fails fast if either is missing.
pub fn load_pipeline(
    config: &Config,
) -> Result<FacePipeline<ScrfdLocator, ArcFaceExtractor>, EngineError> {
    let scrfd_path = config.scrfd_model_path();
    let locator = ScrfdLocator::load(&scrfd_path, config.locator_settings())?;
    tracing::info!(path = %scrfd_path, "SCRFD locator loaded");

    let arcface_path = config.arcface_model_path();
    let extractor = ArcFaceExtractor::load(&arcface_path)?;
    tracing::info!(path = %arcface_path, "ArcFace extractor loaded");

    Ok(FacePipeline::new(locator, extractor))
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the models and the store; requests are served one at a
/// time in arrival order.
pub fn spawn_engine<L, X, S>(
    mut pipeline: FacePipeline<L, X>,
    store: S,
    matcher: EuclideanMatcher,
) -> Result<EngineHandle, EngineError>
where
    L: FaceLocator + Send + 'static,
    X: SignatureExtractor + Send + 'static,
    S: DirectoryStore + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!(threshold = matcher.threshold(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        student_id,
                        image,
                        reply,
                    } => {
                        let result =
                            EnrollmentManager::new(&store).enroll(&mut pipeline, &student_id, &image);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Verify {
                        student_id,
                        image,
                        reply,
                    } => {
                        let result = Verifier::new(&store, matcher).verify(
                            &mut pipeline,
                            &student_id,
                            &image,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::MarkPresent {
                        filter,
                        subject_id,
                        date,
                        images,
                        reply,
                    } => {
                        let result = BatchAttendance::new(&store, BatchIdentifier::new(matcher))
                            .mark_present(&mut pipeline, &filter, &subject_id, date, &images);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
