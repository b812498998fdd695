use archivist_core::{clean_page_url, ContentType};

/// How a paginated view addresses its pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// `…/12-chat/?page=3`
    Query,
    /// `…/topic/7-hello/page/3/`
    Path,
}

impl Paging {
    /// The first-page address of the view `current` points into.
    pub fn base_url(self, current: &str) -> String {
        let without_fragment = current.split('#').next().unwrap_or(current);
        match self {
            Paging::Query => clean_page_url(without_fragment).to_string(),
            Paging::Path => {
                let path = without_fragment.split('?').next().unwrap_or(without_fragment);
                let mut base = match path.find("/page/") {
                    Some(index) => path[..index + 1].to_string(),
                    None => path.to_string(),
                };
                if !base.ends_with('/') {
                    base.push('/');
                }
                base
            }
        }
    }

    pub fn page_url(self, base: &str, page: u32) -> String {
        match self {
            Paging::Query => format!("{base}?page={page}"),
            Paging::Path if page <= 1 => base.to_string(),
            Paging::Path => format!("{base}page/{page}/"),
        }
    }

    /// Substring the address contains once page `page` has loaded.
    pub fn page_marker(self, page: u32) -> String {
        match self {
            Paging::Query => format!("?page={page}"),
            Paging::Path => format!("/page/{page}/"),
        }
    }

    /// Page number a pagination link points at.
    pub fn page_number(self, href: &str) -> Option<u32> {
        let href = href.split('#').next().unwrap_or(href);
        let marker = match self {
            Paging::Query => "?page=",
            Paging::Path => "/page/",
        };
        let start = href.find(marker)? + marker.len();
        let digits: String = href[start..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok().filter(|page| *page > 0)
    }

    pub fn permalink(self, base: &str, page: u32, comment_id: &str) -> String {
        match self {
            Paging::Query => format!("{base}?page={page}#findComment-{comment_id}"),
            Paging::Path => format!("{base}?do=findComment&comment={comment_id}"),
        }
    }
}

/// Selectors and addressing for one kind of paginated post view.
#[derive(Debug, Clone, Copy)]
pub struct PageLayout {
    pub content_type: ContentType,
    pub paging: Paging,
    pub default_title: &'static str,
    pub title: &'static str,
    pub feed: &'static str,
    /// Every post of the page, from the document root.
    pub articles: &'static str,
    /// A post, relative to the feed.
    pub article: &'static str,
    pub pagination_last: &'static str,
    pub author: &'static str,
    pub time: &'static str,
    pub content: &'static str,
    pub group: Option<&'static str>,
    pub group_icon: Option<&'static str>,
    /// Member panel listing every participant, when the view has one.
    pub members: Option<&'static str>,
}

pub const MESSENGER_V4: PageLayout = PageLayout {
    content_type: ContentType::Messenger,
    paging: Paging::Query,
    default_title: "Invision Community Messenger",
    title: "#elMessageViewer div.ipsPageHeader h1.ipsType_pageTitle",
    feed: "#elMessageViewer div[data-role=\"commentFeed\"]",
    articles: "#elMessageViewer div[data-role=\"commentFeed\"] article",
    article: "article",
    pagination_last: "#elMessageViewer li.ipsPagination_last > a",
    author: "h3.ipsComment_author",
    time: "time",
    content: "div[data-role=\"commentContent\"]",
    group: Some("[data-role=\"group\"]"),
    group_icon: None,
    members: Some("#elMessageViewer div.cMessage_members ol li.ipsPhotoPanel"),
};

pub const TOPIC_V4: PageLayout = PageLayout {
    content_type: ContentType::Topic,
    paging: Paging::Path,
    default_title: "Invision Community Topic",
    title: "div.ipsPageHeader h1.ipsType_pageTitle",
    feed: "div[data-role=\"commentFeed\"]",
    articles: "div[data-role=\"commentFeed\"] article",
    article: "article",
    pagination_last: "li.ipsPagination_last > a",
    author: "h3.cAuthorPane_author",
    time: "time",
    content: "div[data-role=\"commentContent\"]",
    group: Some("[data-role=\"group\"]"),
    group_icon: Some("[data-role=\"group-icon\"] img"),
    members: None,
};

/// Shown while a selected page is checked.
pub const MESSENGER_LOADING: &str = "#elMessageViewer div.ipsLoading";
