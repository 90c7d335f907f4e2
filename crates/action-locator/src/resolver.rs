//! Element resolver with fallback chain orchestration

use crate::{errors::LocatorError, types::*};
use async_trait::async_trait;
use cdp_adapter::{ElementHandle, FindBy, PageDriver};
use replay_core_types::ElementDescriptor;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Element resolver trait
#[async_trait]
pub trait ElementResolver: Send + Sync {
    /// Resolve element with fallback chain
    async fn resolve(&self, descriptor: &ElementDescriptor) -> Result<Resolution, LocatorError>;

    /// Try to resolve with specific strategy
    async fn resolve_with_strategy(
        &self,
        descriptor: &ElementDescriptor,
        strategy: LocatorStrategy,
    ) -> Result<Option<ElementHandle>, LocatorError>;
}

/// Default element resolver implementation
pub struct DefaultElementResolver {
    page: Arc<dyn PageDriver>,
}

impl DefaultElementResolver {
    pub fn new(page: Arc<dyn PageDriver>) -> Self {
        Self { page }
    }

    /// Lookup for one recorded strategy, `None` when the descriptor leaves it empty.
    pub fn lookup_for(descriptor: &ElementDescriptor, strategy: LocatorStrategy) -> Option<FindBy> {
        match strategy {
            LocatorStrategy::Id => descriptor.id().map(|v| FindBy::Id(v.to_string())),
            LocatorStrategy::Name => descriptor.name().map(|v| FindBy::Name(v.to_string())),
            LocatorStrategy::Css => descriptor.css().map(|v| FindBy::Css(v.to_string())),
            LocatorStrategy::XPath => descriptor.xpath().map(|v| FindBy::XPath(v.to_string())),
            LocatorStrategy::Healed | LocatorStrategy::DomText => None,
        }
    }
}

#[async_trait]
impl ElementResolver for DefaultElementResolver {
    async fn resolve(&self, descriptor: &ElementDescriptor) -> Result<Resolution, LocatorError> {
        if !descriptor.has_any_locator() {
            return Err(LocatorError::InvalidDescriptor(
                "descriptor has no id, name, css, xpath or text".to_string(),
            ));
        }
        debug!(target: "action-locator", %descriptor, "resolving element");

        let mut tried = Vec::new();
        for strategy in LocatorStrategy::fallback_chain() {
            let Some(lookup) = Self::lookup_for(descriptor, strategy) else {
                continue;
            };
            debug!(target: "action-locator", strategy = strategy.name(), "trying strategy");

            match self.page.find(&lookup).await {
                Ok(Some(handle)) => {
                    info!(target: "action-locator", %descriptor, %lookup, "element resolved");
                    return Ok(Resolution::direct(
                        handle,
                        strategy,
                        lookup.value().to_string(),
                    ));
                }
                Ok(None) => {
                    debug!(target: "action-locator", strategy = strategy.name(), "no element for strategy");
                    tried.push(lookup.to_string());
                }
                Err(err) if err.is_connection() => return Err(err.into()),
                Err(err) => {
                    warn!(target: "action-locator", strategy = strategy.name(), error = %err, "strategy lookup failed");
                    tried.push(format!("{lookup} ({err})"));
                }
            }
        }

        Err(LocatorError::ElementNotFound {
            descriptor: descriptor.to_string(),
            tried,
        })
    }

    async fn resolve_with_strategy(
        &self,
        descriptor: &ElementDescriptor,
        strategy: LocatorStrategy,
    ) -> Result<Option<ElementHandle>, LocatorError> {
        match Self::lookup_for(descriptor, strategy) {
            Some(lookup) => Ok(self.page.find(&lookup).await?),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::{MemoryElement, MemoryPage};

    fn page() -> Arc<MemoryPage> {
        Arc::new(
            MemoryPage::new("https://shop.test/", "Shop")
                .with_element(MemoryElement::new("input").name("q").css("input.search"))
                .with_element(MemoryElement::new("button").id("go").css("#go")),
        )
    }

    #[tokio::test]
    async fn strategies_are_tried_in_order_and_first_match_wins() {
        let page = page();
        let resolver = DefaultElementResolver::new(page.clone());
        let descriptor = ElementDescriptor::default()
            .with_id("missing")
            .with_name("q")
            .with_css("#go");

        let found = resolver.resolve(&descriptor).await.unwrap();
        assert_eq!(found.strategy, LocatorStrategy::Name);
        assert_eq!(found.locator, "q");
        assert_eq!(
            page.lookups(),
            vec![FindBy::Id("missing".into()), FindBy::Name("q".into())]
        );
    }

    #[tokio::test]
    async fn empty_strategies_are_skipped() {
        let page = page();
        let resolver = DefaultElementResolver::new(page.clone());
        let descriptor = ElementDescriptor::default().with_id("  ").with_css("#go");

        let found = resolver.resolve(&descriptor).await.unwrap();
        assert_eq!(found.strategy, LocatorStrategy::Css);
        assert_eq!(page.lookups(), vec![FindBy::Css("#go".into())]);
    }

    #[tokio::test]
    async fn not_found_lists_every_tried_strategy() {
        let resolver = DefaultElementResolver::new(page());
        let descriptor = ElementDescriptor::default()
            .with_id("nope")
            .with_xpath("//div[@id='nope']");

        match resolver.resolve(&descriptor).await {
            Err(LocatorError::ElementNotFound { tried, .. }) => assert_eq!(tried.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn resolver_logs_under_its_crate_target() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let resolver = DefaultElementResolver::new(page());
        let descriptor = ElementDescriptor::default().with_id("nope").with_css("#go");
        resolver.resolve(&descriptor).await.unwrap();

        let output = String::from_utf8(buf.0.lock().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines.len() >= 3, "{output}");
        assert!(lines.iter().all(|line| line.contains("action-locator")), "{output}");
    }

    #[tokio::test]
    async fn descriptor_without_locators_is_rejected() {
        let page = page();
        let resolver = DefaultElementResolver::new(page.clone());
        let err = resolver
            .resolve(&ElementDescriptor::default().with_tag("button"))
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::InvalidDescriptor(_)));
        assert!(page.lookups().is_empty());
    }
}
