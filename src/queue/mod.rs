pub mod loading_point_queue;

pub use loading_point_queue::{Admission, LoadingPointQueueManager, PromotionTicket, QueueSnapshot};
