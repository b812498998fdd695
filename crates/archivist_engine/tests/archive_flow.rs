mod common;

use std::fs;

use archivist_core::{DispatchRequest, JobKind, OutboundAction};
use common::{auth_url, messenger_url, signed_in_page, Harness, FakeSite, ROOT};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const CONVERSATION: &str = "https://forum.example/messenger/12-chat/";

fn article(id: u32, author: &str, datetime: &str, content: &str) -> String {
    format!(
        r#"<article id="elComment_{id}">
            <h3 class="ipsComment_author"><a href="{ROOT}/profile/{id}-{author}/">{author}</a></h3>
            <time datetime="{datetime}">whenever</time>
            <div data-role="commentContent">{content}</div>
        </article>"#
    )
}

fn conversation_page(articles: &[String], pagination: &str) -> String {
    format!(
        r#"<html><body><div id="elMessageViewer">
            <div class="ipsPageHeader"><h1 class="ipsType_pageTitle"> Weekend plans </h1></div>
            <div class="cMessage_members"><ol>
                <li class="ipsPhotoPanel"><a href="{ROOT}/profile/1-alice/"><img alt="Alice" src="//cdn.example/alice.png"></a></li>
                <li class="ipsPhotoPanel"><a href="{ROOT}/profile/2-bob/"><img alt="Bob" src="//cdn.example/bob.png"></a></li>
            </ol></div>
            <ul class="ipsPagination">{pagination}</ul>
            <div data-role="commentFeed">{}</div>
        </div></body></html>"#,
        articles.join("\n")
    )
}

fn messenger_site() -> FakeSite {
    let last = format!(r#"<li class="ipsPagination_last"><a href="{CONVERSATION}?page=2">Last</a></li>"#);
    let page_one = conversation_page(
        &[
            article(101, "Alice", "2024-01-01T10:00:00Z", r#"<p>Hi <img src="//cdn.example/wave.png"></p>"#),
            article(102, "Bob", "2024-01-01T10:05:00Z", "<p>Hey</p>"),
        ],
        &last,
    );
    let page_two = conversation_page(
        &[article(103, "Alice", "2024-01-02T09:00:00Z", "<p>Bye</p>")],
        &last,
    );
    FakeSite::new()
        .with_page(&auth_url(), &signed_in_page())
        .with_page(&messenger_url(), "<html><body><ul id=\"inbox\"></ul></body></html>")
        .with_page(CONVERSATION, &page_one)
        .with_page(&format!("{CONVERSATION}?page=2"), &page_two)
}

fn read_lines(path: &str) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn messenger_job_archives_every_page_and_exports() {
    let (harness, registry) = Harness::new(messenger_site());
    let id = registry
        .dispatch(&DispatchRequest::new(4, ROOT, JobKind::Messenger))
        .unwrap();

    harness.wait_for_note(id, "Please sign in to continue.");
    registry.deliver_input(id, json!({})).unwrap();
    assert_eq!(harness.next_state(id).note, "Validating session...");
    harness.wait_for_note(id, "Select a messenger to archive.");
    assert_eq!(harness.site.current_url(), messenger_url());

    harness.site.show(CONVERSATION);
    registry.deliver_input(id, json!({})).unwrap();
    let seen = harness.wait_for_note(id, "Operation completed successfully.");

    let progress: Vec<f64> = seen
        .iter()
        .filter(|p| p.action == OutboundAction::ProgressUpdate)
        .map(|p| p.data["progress"].as_f64().unwrap())
        .collect();
    assert_eq!(progress, vec![0.5, 1.0]);

    let result = seen
        .iter()
        .find(|p| p.action == OutboundAction::ResultAvailable)
        .expect("result packet");
    let path = result.data["path"].as_str().unwrap().to_string();
    assert!(path.ends_with(".json"));
    assert!(path.starts_with(harness.export_dir.path().to_str().unwrap()));

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["title"], "Weekend plans");
    assert_eq!(lines[0]["type"], "MESSENGER");
    assert_eq!(
        lines[0]["user_data"]["Bob"],
        json!({
            "profile_url": format!("{ROOT}/profile/2-bob/"),
            "avatar_url": "//cdn.example/bob.png",
            "group": "",
            "group_icon_url": "",
        })
    );
    assert_eq!(lines[1]["page"], 1);
    assert_eq!(lines[2]["page"], 2);

    let first = &lines[1]["posts"][0];
    assert_eq!(first["author"], "Alice");
    assert_eq!(first["datetime"], "2024-01-01T10:00:00Z");
    assert_eq!(first["link"], format!("{CONVERSATION}?page=1#findComment-101"));
    let content = first["content"].as_str().unwrap();
    assert!(content.contains(r#"src="https://cdn.example/wave.png""#), "{content}");
    assert_eq!(lines[2]["posts"][0]["link"], format!("{CONVERSATION}?page=2#findComment-103"));

    registry.terminate(id).unwrap();
    assert_eq!(harness.launcher.release_count(), 1);
    assert_eq!(harness.site.quits(), 1);
    assert!(registry.is_empty());
}

#[test]
fn messenger_list_without_conversation_is_rejected() {
    let site = messenger_site().with_page(
        "https://forum.example/messenger/?folder=myconvo",
        r#"<html><body><div id="elMessageViewer"><div class="ipsLoading"></div></div></body></html>"#,
    );
    let (harness, registry) = Harness::new(site);
    let id = registry
        .dispatch(&DispatchRequest::new(4, ROOT, JobKind::Messenger))
        .unwrap();
    harness.wait_for_note(id, "Please sign in to continue.");
    registry.deliver_input(id, json!({})).unwrap();
    harness.wait_for_note(id, "Select a messenger to archive.");

    harness.site.show("https://forum.example/messenger/?folder=myconvo");
    registry.deliver_input(id, json!({})).unwrap();
    assert_eq!(harness.next_state(id).note, "Preparing...");
    assert_eq!(harness.next_state(id).note, "No messenger selected. Please try again.");

    registry.deliver_input(id, json!({})).unwrap();
    assert_eq!(harness.next_state(id).note, "Select a messenger to archive.");
    registry.terminate(id).unwrap();
}

#[test]
fn unresolvable_pagination_reports_internal_error() {
    let broken = conversation_page(
        &[article(101, "Alice", "2024-01-01T10:00:00Z", "<p>Hi</p>")],
        r#"<li class="ipsPagination_last"><a href="javascript:void(0)">Last</a></li>"#,
    );
    let site = messenger_site().with_page(CONVERSATION, &broken);
    let (harness, registry) = Harness::new(site);
    let id = registry
        .dispatch(&DispatchRequest::new(4, ROOT, JobKind::Messenger))
        .unwrap();
    harness.wait_for_note(id, "Please sign in to continue.");
    registry.deliver_input(id, json!({})).unwrap();
    harness.wait_for_note(id, "Select a messenger to archive.");
    harness.site.show(CONVERSATION);
    registry.deliver_input(id, json!({})).unwrap();

    let seen = harness.wait_for_note(id, "An internal error occurred. Open log?");
    assert!(seen.iter().all(|p| p.action != OutboundAction::ResultAvailable));

    registry.deliver_input(id, json!({})).unwrap();
    assert!(common::eventually(|| registry.is_empty()));
    assert!(common::eventually(|| harness.launcher.release_count() == 1));
}

#[test]
fn topic_job_collects_user_data_from_posts() {
    let topic = "https://forum.example/topic/7-hello/";
    let post = format!(
        r#"<article id="elComment_55">
            <h3 class="cAuthorPane_author"><a href="{ROOT}/profile/3-carol/">Carol</a></h3>
            <a class="ipsUserPhoto"><img src="https://cdn.example/carol.png" alt="Carol"></a>
            <span data-role="group">Moderators</span>
            <span data-role="group-icon"><img src="https://cdn.example/mod.png"></span>
            <time datetime="2023-05-05T05:05:05Z">May</time>
            <div data-role="commentContent"><p>First!</p></div>
        </article>"#
    );
    let page = format!(
        r#"<html><body>
            <div class="ipsPageHeader"><h1 class="ipsType_pageTitle">Hello world</h1></div>
            <div data-role="commentFeed">{post}</div>
        </body></html>"#
    );
    let site = FakeSite::new()
        .with_page(&auth_url(), &signed_in_page())
        .with_page(topic, &page);
    let (harness, registry) = Harness::new(site);
    let id = registry
        .dispatch(&DispatchRequest::new(4, ROOT, JobKind::Topic))
        .unwrap();
    harness.wait_for_note(id, "Please sign in to continue.");
    registry.deliver_input(id, json!({})).unwrap();
    harness.wait_for_note(id, "Navigate to any topic to begin archiving.");

    registry.deliver_input(id, json!({})).unwrap();
    assert_eq!(harness.next_state(id).note, "Preparing...");
    assert_eq!(harness.next_state(id).note, "No topic selected. Please try again.");
    registry.deliver_input(id, json!({})).unwrap();
    harness.wait_for_note(id, "Navigate to any topic to begin archiving.");

    harness.site.show(topic);
    registry.deliver_input(id, json!({})).unwrap();
    let seen = harness.wait_for_note(id, "Operation completed successfully.");
    let path = seen
        .iter()
        .find(|p| p.action == OutboundAction::ResultAvailable)
        .and_then(|p| p.data["path"].as_str())
        .unwrap()
        .to_string();

    let lines = read_lines(&path);
    assert_eq!(lines[0]["title"], "Hello world");
    assert_eq!(lines[0]["type"], "TOPIC");
    assert_eq!(
        lines[0]["user_data"]["Carol"],
        json!({
            "profile_url": format!("{ROOT}/profile/3-carol/"),
            "avatar_url": "https://cdn.example/carol.png",
            "group": "Moderators",
            "group_icon_url": "https://cdn.example/mod.png",
        })
    );
    assert_eq!(
        lines[1]["posts"][0]["link"],
        format!("{topic}?do=findComment&comment=55")
    );
    registry.terminate(id).unwrap();
}

#[test]
fn author_names_are_decoded_text() {
    let topic = "https://forum.example/topic/8-cartoons/";
    let post = format!(
        r#"<article id="elComment_60">
            <h3 class="cAuthorPane_author"><a href="{ROOT}/profile/4-tom-jerry/">Tom &amp; Jerry</a>&nbsp;</h3>
            <a class="ipsUserPhoto"><img src="https://cdn.example/default.png" alt=""></a>
            <div class="cAuthorPane_photo"><img src="https://cdn.example/tj.png" alt="Tom &amp; Jerry"></div>
            <time datetime="2023-06-06T06:06:06Z">June</time>
            <div data-role="commentContent"><p>Cat &amp; mouse</p></div>
        </article>"#
    );
    let page = format!(
        r#"<html><body>
            <div class="ipsPageHeader"><h1 class="ipsType_pageTitle">Cats &amp; mice</h1></div>
            <div data-role="commentFeed">{post}</div>
        </body></html>"#
    );
    let site = FakeSite::new()
        .with_page(&auth_url(), &signed_in_page())
        .with_page(topic, &page);
    let (harness, registry) = Harness::new(site);
    let id = registry
        .dispatch(&DispatchRequest::new(4, ROOT, JobKind::Topic))
        .unwrap();
    harness.wait_for_note(id, "Please sign in to continue.");
    registry.deliver_input(id, json!({})).unwrap();
    harness.wait_for_note(id, "Navigate to any topic to begin archiving.");
    harness.site.show(topic);
    registry.deliver_input(id, json!({})).unwrap();
    let seen = harness.wait_for_note(id, "Operation completed successfully.");
    let path = seen
        .iter()
        .find(|p| p.action == OutboundAction::ResultAvailable)
        .and_then(|p| p.data["path"].as_str())
        .unwrap()
        .to_string();

    let lines = read_lines(&path);
    assert_eq!(lines[0]["title"], "Cats & mice");
    assert_eq!(lines[1]["posts"][0]["author"], "Tom & Jerry");
    let users = lines[0]["user_data"].as_object().unwrap();
    assert_eq!(users.keys().collect::<Vec<_>>(), vec!["Tom & Jerry"]);
    assert_eq!(users["Tom & Jerry"]["avatar_url"], "https://cdn.example/tj.png");
    registry.terminate(id).unwrap();
}
