//! Campaign Module - Lifecycle, templating and paced delivery

mod direct;
mod manager;
mod pipeline;
pub mod template;
mod worker;

pub use direct::{DirectSendRequest, DirectSendResult, DirectSender};
pub use manager::{apply_transition, CampaignManager};
pub use pipeline::{BatchReport, PipelineSettings, SendPipeline};
pub use template::{detect_variables, RenderedMessage, TemplateRenderer};
pub use worker::CampaignWorker;
