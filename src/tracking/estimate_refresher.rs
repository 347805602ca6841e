//! Keeps the travel estimate to the target stop current without flooding the directions provider
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    api_clients::{DirectionsError, DirectionsProvider},
    model::{Coordinate, StoppingPoint, TravelEstimate},
    utils::haversine_distance_m,
};

pub const DEFAULT_MIN_REFRESH_DISTANCE_M: f64 = 10.0;

#[derive(thiserror::Error, Debug)]
#[error("travel estimate to stopping point {target_id} unavailable")]
pub struct EstimateUnavailable {
    pub target_id: String,
    #[source]
    pub source: DirectionsError,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RefreshOutcome {
    Refreshed(TravelEstimate),
    /// No request was made, the stored estimate (if any) stands
    Unchanged,
    /// The route is complete and the estimate was dropped
    Cleared,
}

pub struct EstimateRefresher<P> {
    provider: P,
    min_refresh_distance_m: f64,
    estimate: Option<TravelEstimate>,
}

impl<P: DirectionsProvider> EstimateRefresher<P> {
    pub fn new(provider: P, min_refresh_distance_m: f64) -> Self {
        Self {
            provider,
            min_refresh_distance_m,
            estimate: None,
        }
    }

    pub fn estimate(&self) -> Option<&TravelEstimate> {
        self.estimate.as_ref()
    }

    /// Requests directions from `position` to `target` at most once.
    ///
    /// A failed request leaves the previous estimate in place. Without a target
    /// the estimate is cleared, without a position nothing can be requested.
    pub async fn refresh(
        &mut self,
        position: Option<Coordinate>,
        target: Option<&StoppingPoint>,
    ) -> Result<RefreshOutcome, EstimateUnavailable> {
        let Some(target) = target else {
            if self.estimate.take().is_some() {
                info!("route complete, clearing travel estimate");
            }
            return Ok(RefreshOutcome::Cleared);
        };

        let Some(position) = position else {
            debug!("no vehicle fix yet, skipping directions request");
            return Ok(RefreshOutcome::Unchanged);
        };

        if self.is_current_for(position, target) {
            debug!(target_id = %target.id, "vehicle barely moved, keeping travel estimate");
            return Ok(RefreshOutcome::Unchanged);
        }

        match self.provider.directions(position, target.coordinates).await {
            Ok(directions) => {
                let estimate = TravelEstimate {
                    distance_m: directions.distance_m,
                    duration_s: directions.duration_s,
                    geometry: directions.geometry,
                    target_id: target.id.clone(),
                    origin: position,
                    computed_at: Utc::now(),
                };
                self.estimate = Some(estimate.clone());

                Ok(RefreshOutcome::Refreshed(estimate))
            }
            Err(source) => {
                warn!(target_id = %target.id, "keeping previous travel estimate: {source}");

                Err(EstimateUnavailable {
                    target_id: target.id.clone(),
                    source,
                })
            }
        }
    }

    fn is_current_for(&self, position: Coordinate, target: &StoppingPoint) -> bool {
        match &self.estimate {
            Some(estimate) if estimate.target_id == target.id => {
                haversine_distance_m(estimate.origin, position) < self.min_refresh_distance_m
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EstimateRefresher, RefreshOutcome};
    use crate::{
        api_clients::DirectionsError,
        model::Coordinate,
        test_support::{FakeDirections, directions, stop},
    };

    #[tokio::test]
    async fn test_refresh_stores_estimate() -> Result<(), anyhow::Error> {
        let provider = FakeDirections::default();
        provider.push(Ok(directions(250.0, 60.0)));
        let mut refresher = EstimateRefresher::new(provider.clone(), 10.0);
        let target = stop("b", 2, 0.0, 0.001);

        let outcome = refresher.refresh(Some(Coordinate::new(0.0, 0.0)), Some(&target)).await?;

        let RefreshOutcome::Refreshed(estimate) = outcome else {
            panic!("expected a refreshed estimate, got {outcome:?}");
        };
        assert_eq!(estimate.distance_m, 250.0);
        assert_eq!(estimate.target_id, "b");
        assert_eq!(refresher.estimate(), Some(&estimate));
        assert_eq!(provider.calls(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_estimate() -> Result<(), anyhow::Error> {
        let provider = FakeDirections::default();
        provider.push(Ok(directions(250.0, 60.0)));
        provider.push(Err(DirectionsError::NoRoutes { code: Some("NoRoute".into()) }));
        let mut refresher = EstimateRefresher::new(provider.clone(), 0.0);
        let target = stop("b", 2, 0.0, 0.001);

        refresher.refresh(Some(Coordinate::new(0.0, 0.0)), Some(&target)).await?;
        let before = refresher.estimate().cloned();

        let err = refresher
            .refresh(Some(Coordinate::new(0.0, 0.0005)), Some(&target))
            .await
            .expect_err("the provider failure should surface");

        assert_eq!(err.target_id, "b");
        assert!(before.is_some());
        assert_eq!(refresher.estimate().cloned(), before);
        assert_eq!(provider.calls(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_no_target_clears_without_calling() -> Result<(), anyhow::Error> {
        let provider = FakeDirections::default();
        let mut refresher = EstimateRefresher::new(provider.clone(), 10.0);
        let target = stop("b", 2, 0.0, 0.001);
        refresher.refresh(Some(Coordinate::new(0.0, 0.0)), Some(&target)).await?;

        let outcome = refresher.refresh(Some(Coordinate::new(0.0, 0.001)), None).await?;

        assert_eq!(outcome, RefreshOutcome::Cleared);
        assert!(refresher.estimate().is_none());
        assert_eq!(provider.calls(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_small_movement_skips_request() -> Result<(), anyhow::Error> {
        let provider = FakeDirections::default();
        let mut refresher = EstimateRefresher::new(provider.clone(), 10.0);
        let target = stop("c", 3, 0.0, 0.002);

        refresher.refresh(Some(Coordinate::new(0.0, 0.0)), Some(&target)).await?;
        // ~5.5 m further
        let outcome = refresher
            .refresh(Some(Coordinate::new(0.0, 0.00005)), Some(&target))
            .await?;
        assert_eq!(outcome, RefreshOutcome::Unchanged);
        assert_eq!(provider.calls(), 1);

        // a new target always triggers a request
        let other = stop("b", 2, 0.0, 0.001);
        let outcome = refresher
            .refresh(Some(Coordinate::new(0.0, 0.00005)), Some(&other))
            .await?;
        assert!(matches!(outcome, RefreshOutcome::Refreshed(_)));
        assert_eq!(provider.calls(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_no_position_skips_request() -> Result<(), anyhow::Error> {
        let provider = FakeDirections::default();
        let mut refresher = EstimateRefresher::new(provider.clone(), 10.0);
        let target = stop("a", 1, 0.0, 0.0);

        let outcome = refresher.refresh(None, Some(&target)).await?;

        assert_eq!(outcome, RefreshOutcome::Unchanged);
        assert_eq!(provider.calls(), 0);

        Ok(())
    }
}
