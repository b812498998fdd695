use archivist_core::{ArchiveResult, JobState, Post, UserData};
use engine_logging::{engine_debug, engine_info, engine_warn};

use super::layout::PageLayout;
use crate::context::{JobContext, JobError};
use crate::driver::ElementHandle;

const AVATAR_FALLBACK: &str = "a.ipsUserPhoto img";

/// Archives every page of the view the browser currently shows.
pub(crate) fn archive_pages(
    ctx: &mut JobContext,
    layout: &PageLayout,
) -> Result<ArchiveResult, JobError> {
    let base_url = layout.paging.base_url(&ctx.current_url()?);
    ctx.navigate(&base_url)?;
    let timeout = ctx.settings().element_timeout;
    if !ctx.wait_until_url_contains(&base_url, timeout)? {
        engine_debug!("address did not settle on {base_url}");
    }

    let final_page = last_page(ctx, layout)?;
    ctx.set_state(JobState::archiving())?;

    let title = match ctx.find(None, layout.title)? {
        Some(heading) => ctx.text(&heading)?,
        None => {
            engine_warn!("no title found, using '{}'", layout.default_title);
            layout.default_title.to_string()
        }
    };
    let mut result = ArchiveResult::new(title, layout.content_type);

    let users_from_posts = !collect_members(ctx, layout, &mut result)?;
    if users_from_posts {
        engine_info!("collecting user data from posts");
    }

    for page in 1..=final_page {
        ctx.check_cancelled()?;
        if page > 1 {
            ctx.navigate(&layout.paging.page_url(&base_url, page))?;
            let marker = layout.paging.page_marker(page);
            if !ctx.wait_until_url_contains(&marker, timeout)? {
                return Err(JobError::Timeout {
                    what: format!("address containing {marker}"),
                    timeout,
                });
            }
        }

        let feed = ctx.await_element(layout.feed)?;
        ctx.await_element(layout.articles)?;
        let articles = ctx.find_all(Some(&feed), layout.article)?;
        engine_info!("reading {} posts ({page}/{final_page})", articles.len());

        let mut posts = Vec::with_capacity(articles.len());
        for article in &articles {
            let post = read_post(ctx, layout, &base_url, page, article)?;
            if users_from_posts && !result.knows_user(&post.author) {
                let data = post_user_data(ctx, layout, article, &post.author)?;
                result.record_user(&post.author, data);
            }
            posts.push(post);
        }
        result.push_page(posts);
        ctx.update_progress(f64::from(page) / f64::from(final_page));
    }

    Ok(result)
}

fn last_page(ctx: &mut JobContext, layout: &PageLayout) -> Result<u32, JobError> {
    let Some(link) = ctx.find(None, layout.pagination_last)? else {
        engine_warn!("no pagination found, archiving a single page");
        return Ok(1);
    };
    let href = ctx.attribute(&link, "href")?.unwrap_or_default();
    engine_info!("found last page link {href}");
    layout
        .paging
        .page_number(&href)
        .ok_or(JobError::PaginationUnresolvable(href))
}

/// Fills user data from the member panel. Returns `false` when the view has none.
fn collect_members(
    ctx: &mut JobContext,
    layout: &PageLayout,
    result: &mut ArchiveResult,
) -> Result<bool, JobError> {
    let Some(selector) = layout.members else {
        return Ok(false);
    };
    let members = ctx.find_all(None, selector)?;
    if members.is_empty() {
        engine_warn!("no member panel found");
        return Ok(false);
    }
    for member in &members {
        let Some(avatar) = ctx.find(Some(member), "a img")? else {
            continue;
        };
        let name = ctx.attribute(&avatar, "alt")?.unwrap_or_default();
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let profile_url = match ctx.find(Some(member), "a")? {
            Some(link) => ctx.attribute(&link, "href")?.unwrap_or_default(),
            None => String::new(),
        };
        let avatar_url = ctx.attribute(&avatar, "src")?.unwrap_or_default();
        result.record_user(
            name,
            UserData {
                profile_url,
                avatar_url: avatar_url.trim().to_string(),
                ..UserData::default()
            },
        );
    }
    Ok(true)
}

fn read_post(
    ctx: &mut JobContext,
    layout: &PageLayout,
    base_url: &str,
    page: u32,
    article: &ElementHandle,
) -> Result<Post, JobError> {
    let author = ctx.require(Some(article), layout.author)?;
    let time = ctx.require(Some(article), layout.time)?;
    let content = ctx.require(Some(article), layout.content)?;

    let author = ctx.text(&author)?;
    let datetime = ctx
        .attribute(&time, "datetime")?
        .unwrap_or_default()
        .trim()
        .to_string();
    let raw_content = ctx.inner_html(&content)?;
    let content = ctx.rewriter().rewrite_html(raw_content.trim());
    let comment_id = ctx
        .attribute(article, "id")?
        .unwrap_or_default()
        .replace("elComment_", "");

    Ok(Post {
        author,
        datetime,
        link: layout.paging.permalink(base_url, page, &comment_id),
        content,
    })
}

fn post_user_data(
    ctx: &mut JobContext,
    layout: &PageLayout,
    article: &ElementHandle,
    author: &str,
) -> Result<UserData, JobError> {
    let mut data = UserData::default();

    if let Some(author_el) = ctx.find(Some(article), layout.author)? {
        if let Some(link) = ctx.find(Some(&author_el), "a")? {
            data.profile_url = ctx.attribute(&link, "href")?.unwrap_or_default();
        }
    }

    for image in ctx.find_all(Some(article), "img")? {
        if ctx.attribute(&image, "alt")?.as_deref().map(str::trim) == Some(author) {
            data.avatar_url = ctx.attribute(&image, "src")?.unwrap_or_default();
            break;
        }
    }
    if data.avatar_url.is_empty() {
        if let Some(image) = ctx.find(Some(article), AVATAR_FALLBACK)? {
            data.avatar_url = ctx.attribute(&image, "src")?.unwrap_or_default();
        }
    }

    if let Some(selector) = layout.group {
        if let Some(group) = ctx.find(Some(article), selector)? {
            data.group = ctx.text(&group)?;
        }
    }
    if let Some(selector) = layout.group_icon {
        if let Some(icon) = ctx.find(Some(article), selector)? {
            data.group_icon_url = ctx.attribute(&icon, "src")?.unwrap_or_default();
        }
    }

    engine_debug!("user data for {author}: {data:?}");
    Ok(data)
}
