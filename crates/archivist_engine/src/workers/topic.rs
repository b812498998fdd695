use archivist_core::{ArchiveResult, ButtonConfig, JobState};
use engine_logging::engine_info;

use super::layout::{PageLayout, TOPIC_V4};
use super::pages::archive_pages;
use crate::context::{JobContext, JobError};
use crate::handler::JobHandler;

const TOPIC_PATH: &str = "/topic/";

fn select_topic() -> JobState {
    JobState::interactive(
        "Navigate to any topic to begin archiving.",
        ButtonConfig::new("Next"),
        vec![],
    )
    .with_hint("Open a topic in the browser and press 'Next'")
}

fn analyzing() -> JobState {
    JobState::progressive("Preparing...")
}

fn invalid_topic() -> JobState {
    JobState::interactive("No topic selected. Please try again.", ButtonConfig::new("OK"), vec![])
}

/// Archives every page of one forum topic.
pub struct TopicWorker {
    layout: PageLayout,
}

impl TopicWorker {
    pub fn v4() -> Self {
        Self { layout: TOPIC_V4 }
    }

    fn select_topic(&self, ctx: &mut JobContext) -> Result<(), JobError> {
        loop {
            ctx.check_cancelled()?;
            ctx.set_state(select_topic())?;

            ctx.set_state(analyzing())?;
            let on_topic = ctx.current_url()?.contains(TOPIC_PATH);
            let timeout = ctx.settings().check_timeout;
            if on_topic && ctx.wait_for(self.layout.articles, timeout)?.is_some() {
                return Ok(());
            }
            ctx.set_state(invalid_topic())?;
        }
    }
}

impl JobHandler for TopicWorker {
    fn execute(&self, ctx: &mut JobContext) -> Result<Option<ArchiveResult>, JobError> {
        self.select_topic(ctx)?;
        let result = archive_pages(ctx, &self.layout)?;
        engine_info!(
            "archived {} posts over {} pages from '{}'",
            result.post_count(),
            result.page_count(),
            result.title
        );
        Ok(Some(result))
    }
}
