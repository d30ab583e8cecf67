//! Entity id collection from listing pages.
//!
//! Listing markup is the least stable part of these portals, so ids are read
//! with two independent strategies. The fallback only runs when the primary
//! strategy finds nothing, and its use is logged.

use indexmap::IndexSet;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{ExtractionError, Result};
use crate::traits::driver::{empty_unless_dead, Driver};
use crate::types::config::ListingSelectors;
use crate::types::entity::EntityId;

/// Which strategy produced the ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStrategy {
    /// Rows carrying a detail anchor
    Anchors,
    /// Id pattern matched against link text or href
    LinkText,
    /// Nothing found
    None,
}

/// Ids found on one listing page, in first-seen order.
#[derive(Debug, Clone)]
pub struct Listing {
    pub ids: IndexSet<EntityId>,
    pub strategy: ListingStrategy,
}

impl Listing {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Reads entity ids from a category listing.
pub struct ListCollector<'a> {
    driver: &'a dyn Driver,
    selectors: &'a ListingSelectors,
    id_pattern: Regex,
}

impl<'a> ListCollector<'a> {
    pub fn new(driver: &'a dyn Driver, selectors: &'a ListingSelectors) -> Result<Self> {
        let id_pattern = Regex::new(&selectors.id_pattern).map_err(|e| ExtractionError::Config {
            reason: format!("listing id pattern: {}", e),
        })?;
        Ok(Self {
            driver,
            selectors,
            id_pattern,
        })
    }

    /// Load `listing_url` and collect its ids.
    pub async fn collect(&self, listing_url: &str) -> Result<Listing> {
        self.driver.navigate(listing_url).await?;
        let listing = self.collect_current().await?;
        info!(
            url = %listing_url,
            count = listing.len(),
            strategy = ?listing.strategy,
            "Listing collected"
        );
        Ok(listing)
    }

    /// Collect ids from the page currently loaded.
    pub async fn collect_current(&self) -> Result<Listing> {
        let ids = self.from_anchors().await?;
        if !ids.is_empty() {
            return Ok(Listing {
                ids,
                strategy: ListingStrategy::Anchors,
            });
        }

        let ids = self.from_links().await?;
        if ids.is_empty() {
            debug!("No ids found by any listing strategy");
            return Ok(Listing {
                ids,
                strategy: ListingStrategy::None,
            });
        }

        warn!(
            count = ids.len(),
            "Detail anchors found nothing, ids taken from link text"
        );
        Ok(Listing {
            ids,
            strategy: ListingStrategy::LinkText,
        })
    }

    async fn from_anchors(&self) -> Result<IndexSet<EntityId>> {
        let mut ids = IndexSet::new();
        let rows = empty_unless_dead(self.driver.find_elements(&self.selectors.row).await)?;

        for row in rows {
            let anchors = empty_unless_dead(
                self.driver
                    .find_within(&row, &self.selectors.detail_anchor)
                    .await,
            )?;
            if anchors.is_empty() {
                continue;
            }
            let text = empty_unless_dead(self.driver.text(&row).await)?;
            if let Some(m) = self.id_pattern.find(&text) {
                ids.insert(EntityId::new(m.as_str()));
            }
        }
        Ok(ids)
    }

    async fn from_links(&self) -> Result<IndexSet<EntityId>> {
        let mut ids = IndexSet::new();
        let links = empty_unless_dead(self.driver.find_elements(&self.selectors.link).await)?;

        for link in links {
            let text = empty_unless_dead(self.driver.text(&link).await)?;
            let found = match self.id_pattern.find(&text) {
                Some(m) => Some(m.as_str().to_string()),
                None => empty_unless_dead(self.driver.attribute(&link, "href").await)?
                    .and_then(|href| self.id_pattern.find(&href).map(|m| m.as_str().to_string())),
            };
            if let Some(id) = found {
                ids.insert(EntityId::new(id));
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::testing::{listing_page, listing_page_links_only, MockDriver, MockElement, MockPage};
    use crate::types::config::PortalConfig;

    fn portal() -> PortalConfig {
        PortalConfig::new("MF", "https://mc.example.org/mf")
    }

    fn ids(listing: &Listing) -> Vec<&str> {
        listing.ids.iter().map(|id| id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_primary_strategy_keeps_order_and_dedups() {
        let portal = portal();
        let driver = MockDriver::new().with_page(listing_page(
            &portal,
            "awaiting-reviews",
            &["MF-2024-0102", "MF-2024-0017.R1", "MF-2024-0102"],
        ));
        let collector = ListCollector::new(&driver, &portal.listing).unwrap();

        let listing = collector
            .collect(&portal.listing_url("awaiting-reviews"))
            .await
            .unwrap();

        assert_eq!(listing.strategy, ListingStrategy::Anchors);
        assert_eq!(ids(&listing), vec!["MF-2024-0102", "MF-2024-0017.R1"]);
    }

    #[tokio::test]
    async fn test_fallback_to_link_text() {
        let portal = portal();
        let driver = MockDriver::new().with_page(listing_page_links_only(
            &portal,
            "awaiting-decision",
            &["MF-2023-0999", "MF-2024-0001"],
        ));
        let collector = ListCollector::new(&driver, &portal.listing).unwrap();

        let listing = collector
            .collect(&portal.listing_url("awaiting-decision"))
            .await
            .unwrap();

        assert_eq!(listing.strategy, ListingStrategy::LinkText);
        assert_eq!(ids(&listing), vec!["MF-2023-0999", "MF-2024-0001"]);
    }

    #[tokio::test]
    async fn test_fallback_reads_href_when_text_has_no_id() {
        let portal = portal();
        let driver = MockDriver::new().with_page(
            MockPage::new(portal.listing_url("queue"))
                .with_element(MockElement::link("View", portal.detail_url("MF-2024-0555"))),
        );
        let collector = ListCollector::new(&driver, &portal.listing).unwrap();

        let listing = collector.collect(&portal.listing_url("queue")).await.unwrap();
        assert_eq!(ids(&listing), vec!["MF-2024-0555"]);
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let portal = portal();
        let driver = MockDriver::new().with_page(MockPage::new(portal.listing_url("empty")));
        let collector = ListCollector::new(&driver, &portal.listing).unwrap();

        let listing = collector.collect(&portal.listing_url("empty")).await.unwrap();
        assert!(listing.is_empty());
        assert_eq!(listing.strategy, ListingStrategy::None);
    }

    #[tokio::test]
    async fn test_locator_failure_is_empty_but_session_death_propagates() {
        let portal = portal();
        let driver = MockDriver::new().with_page(listing_page(&portal, "q", &["MF-2024-0001"]));
        driver.fail_find(
            &portal.listing.row,
            DriverError::Timeout {
                operation: "find rows".into(),
            },
            1,
        );
        let collector = ListCollector::new(&driver, &portal.listing).unwrap();
        let listing = collector.collect(&portal.listing_url("q")).await.unwrap();
        // Rows timed out and there are no plain links, so nothing is found.
        assert!(listing.is_empty());

        driver.fail_find(
            &portal.listing.row,
            DriverError::SessionDead("invalid session id".into()),
            1,
        );
        let err = collector.collect_current().await.unwrap_err();
        assert!(err.is_session_fatal());
    }

    #[test]
    fn test_bad_id_pattern_is_config_error() {
        let mut portal = portal();
        portal.listing.id_pattern = "([".into();
        let driver = MockDriver::new();
        assert!(matches!(
            ListCollector::new(&driver, &portal.listing),
            Err(ExtractionError::Config { .. })
        ));
    }
}
