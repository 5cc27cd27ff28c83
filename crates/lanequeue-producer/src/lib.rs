pub mod api;
pub mod config;
pub mod dispatcher;

pub use api::{create_router, ApiError, AppState};
pub use config::ProducerConfig;
pub use dispatcher::{DispatchError, DispatchedBatch, Dispatcher};

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use lanequeue_client::{ClientError, Publisher, Result};
    use lanequeue_core::LaneSpec;
    use lanequeue_protocol::Publishing;
    use parking_lot::Mutex;

    /// Publisher double that records what it was given
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub declared: Mutex<Vec<LaneSpec>>,
        pub published: Mutex<Vec<(String, Publishing)>>,
        pub fail: bool,
    }

    impl RecordingPublisher {
        pub fn failing() -> Self {
            RecordingPublisher {
                fail: true,
                ..Default::default()
            }
        }

        pub fn published(&self) -> Vec<(String, Publishing)> {
            self.published.lock().clone()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn declare_lane(&self, lane: LaneSpec) -> Result<()> {
            self.declared.lock().push(lane);
            Ok(())
        }

        async fn publish(&self, lane: &str, publishing: Publishing) -> Result<()> {
            if self.fail {
                return Err(ClientError::ChannelClosed);
            }
            self.published.lock().push((lane.to_string(), publishing));
            Ok(())
        }
    }
}
