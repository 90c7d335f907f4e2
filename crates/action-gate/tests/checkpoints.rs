//! Checkpoint reads against an in-memory page.

use std::sync::Arc;
use std::time::Duration;

use action_gate::{verify_checkpoint, wait_until, GateError};
use cdp_adapter::{ClickEffect, ClickKind, FindBy, MemoryElement, MemoryPage, PageDriver};
use replay_core_types::{CheckpointSpec, CheckpointTarget, ElementTarget, MatchMode};

fn banner_target() -> ElementTarget {
    ElementTarget::object("WelcomeBanner")
}

fn spec(check: CheckpointTarget, expected: &str, mode: MatchMode) -> CheckpointSpec {
    CheckpointSpec {
        check,
        expected: expected.to_string(),
        mode,
        case_sensitive: true,
    }
}

fn account_page() -> MemoryPage {
    MemoryPage::new("https://bank.test/account/42", "Account overview")
        .with_element(
            MemoryElement::new("h1")
                .id("welcome")
                .text("  Welcome back,   Ada  ")
                .attribute("data-tier", "gold"),
        )
        .with_element(MemoryElement::new("input").id("amount").value("120.50"))
        .with_element(MemoryElement::new("div").id("spinner").hidden())
}

#[tokio::test]
async fn element_checks_read_live_values() {
    let page = account_page();
    let welcome = page.find(&FindBy::Id("welcome".into())).await.unwrap().unwrap();
    let amount = page.find(&FindBy::Id("amount".into())).await.unwrap().unwrap();
    let spinner = page.find(&FindBy::Id("spinner".into())).await.unwrap().unwrap();

    let text = spec(
        CheckpointTarget::Text {
            target: banner_target(),
        },
        "Welcome back, Ada",
        MatchMode::Equals,
    );
    verify_checkpoint(&page, Some(&welcome), &text).await.unwrap();

    let value = spec(
        CheckpointTarget::Value {
            target: banner_target(),
        },
        r"^\d+\.\d{2}$",
        MatchMode::Regex,
    );
    verify_checkpoint(&page, Some(&amount), &value).await.unwrap();

    let attribute = spec(
        CheckpointTarget::Attribute {
            target: banner_target(),
            name: "data-tier".into(),
        },
        "gold",
        MatchMode::Equals,
    );
    verify_checkpoint(&page, Some(&welcome), &attribute)
        .await
        .unwrap();

    let hidden = spec(
        CheckpointTarget::Visible {
            target: banner_target(),
        },
        "false",
        MatchMode::Equals,
    );
    verify_checkpoint(&page, Some(&spinner), &hidden).await.unwrap();
}

#[tokio::test]
async fn page_checks_ignore_element() {
    let page = account_page();
    verify_checkpoint(
        &page,
        None,
        &spec(CheckpointTarget::Url, "/account/", MatchMode::Contains),
    )
    .await
    .unwrap();

    let mut title = spec(CheckpointTarget::Title, "ACCOUNT", MatchMode::StartsWith);
    title.case_sensitive = false;
    verify_checkpoint(&page, None, &title).await.unwrap();
}

#[tokio::test]
async fn mismatch_reports_expected_and_actual() {
    let page = account_page();
    let err = verify_checkpoint(
        &page,
        None,
        &spec(CheckpointTarget::Title, "Login", MatchMode::Equals),
    )
    .await
    .unwrap_err();
    match err {
        GateError::CheckpointMismatch {
            check,
            expected,
            actual,
            ..
        } => {
            assert_eq!(check, "page title");
            assert_eq!(expected, "Login");
            assert_eq!(actual, "Account overview");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn wait_until_observes_page_change() {
    let page = Arc::new(account_page());
    page.add_element(MemoryElement::new("button").id("refresh"));
    page.on_click("refresh", ClickEffect::SetTitle("Refreshed".into()));

    let clicker = page.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let button = clicker
            .find(&FindBy::Id("refresh".into()))
            .await
            .unwrap()
            .unwrap();
        clicker.click(&button, ClickKind::Single).await.unwrap();
    });

    let watched = page.clone();
    wait_until(
        "title to change",
        move || {
            let page = watched.clone();
            async move { page.title().await.map(|t| t == "Refreshed").unwrap_or(false) }
        },
        Duration::from_secs(2),
        Duration::from_millis(10),
    )
    .await
    .unwrap();
}
