use archivist_core::{strip_url_scheme, ArchiveResult, ButtonConfig, JobState};
use engine_logging::engine_info;

use super::layout::{PageLayout, MESSENGER_LOADING, MESSENGER_V4};
use super::pages::archive_pages;
use crate::context::{JobContext, JobError};
use crate::handler::JobHandler;

fn select_messenger() -> JobState {
    JobState::interactive("Select a messenger to archive.", ButtonConfig::new("Next"), vec![])
        .with_hint("Click on a messenger in the browser and press 'Next'")
}

fn analyzing() -> JobState {
    JobState::progressive("Preparing...")
}

fn invalid_messenger() -> JobState {
    JobState::interactive(
        "No messenger selected. Please try again.",
        ButtonConfig::new("OK"),
        vec![],
    )
}

/// Archives one private conversation the user picks in the browser.
pub struct MessengerWorker {
    layout: PageLayout,
}

impl MessengerWorker {
    pub fn v4() -> Self {
        Self {
            layout: MESSENGER_V4,
        }
    }

    /// Loops until the browser shows a loaded conversation.
    fn select_conversation(&self, ctx: &mut JobContext) -> Result<(), JobError> {
        let messenger_url = ctx.target().messenger_url();
        loop {
            ctx.check_cancelled()?;
            let current = ctx.current_url()?;
            if !strip_url_scheme(&current).contains(strip_url_scheme(&messenger_url)) {
                ctx.navigate(&messenger_url)?;
            }
            ctx.set_state(select_messenger())?;

            ctx.set_state(analyzing())?;
            if ctx.find(None, MESSENGER_LOADING)?.is_some() {
                ctx.set_state(invalid_messenger())?;
                continue;
            }
            let timeout = ctx.settings().check_timeout;
            if ctx.wait_for(self.layout.articles, timeout)?.is_some() {
                return Ok(());
            }
            ctx.set_state(invalid_messenger())?;
        }
    }
}

impl JobHandler for MessengerWorker {
    fn execute(&self, ctx: &mut JobContext) -> Result<Option<ArchiveResult>, JobError> {
        self.select_conversation(ctx)?;
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
