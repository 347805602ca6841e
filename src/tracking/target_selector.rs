use crate::model::{Route, StoppingPoint, TripProgress};

/// Next stop to drive to: the first unvisited stop in traversal order.
///
/// Outbound trips walk the stops by ascending execution order, way back trips
/// walk them in reverse. `None` means every stop was performed.
pub fn select_target<'a>(
    route: &'a Route,
    progress: &TripProgress,
    is_way_back: bool,
) -> Option<&'a StoppingPoint> {
    route
        .directional_stops(is_way_back)
        .find(|sp| !progress.is_performed(&sp.id))
}

#[cfg(test)]
mod tests {
    use super::select_target;
    use crate::{
        model::TripProgress,
        test_support::{stop, three_stop_route},
    };

    fn target_sequence(is_way_back: bool) -> Vec<Option<String>> {
        let route = three_stop_route();
        let mut progress = TripProgress::default();
        let mut sequence = vec![];

        loop {
            let target = select_target(&route, &progress, is_way_back).map(|sp| sp.id.clone());
            sequence.push(target.clone());
            match target {
                Some(id) => {
                    progress.mark_performed(&id);
                }
                None => break,
            }
        }

        sequence
    }

    #[test]
    fn test_outbound_sequence() {
        assert_eq!(
            target_sequence(false),
            [Some("a".to_string()), Some("b".to_string()), Some("c".to_string()), None]
        );
    }

    #[test]
    fn test_way_back_sequence() {
        assert_eq!(
            target_sequence(true),
            [Some("c".to_string()), Some("b".to_string()), Some("a".to_string()), None]
        );
    }

    #[test]
    fn test_skips_stops_performed_out_of_order() {
        let route = three_stop_route();
        let progress = TripProgress::resumed(["a".to_string(), "c".to_string()]);

        assert_eq!(select_target(&route, &progress, false).map(|sp| sp.id.as_str()), Some("b"));
        assert_eq!(select_target(&route, &progress, true).map(|sp| sp.id.as_str()), Some("b"));
    }

    #[test]
    fn test_empty_route_has_no_target() {
        let mut route = three_stop_route();
        for id in ["a", "b", "c"] {
            route.remove_stopping_point(id);
        }

        assert!(select_target(&route, &TripProgress::default(), false).is_none());
    }

    #[test]
    fn test_is_deterministic_with_equal_orders() {
        let mut route = three_stop_route();
        route.insert_stopping_point(stop("a2", 1, 1.0, 1.0));
        let progress = TripProgress::resumed(["a".to_string()]);

        for _ in 0..3 {
            assert_eq!(
                select_target(&route, &progress, false).map(|sp| sp.id.as_str()),
                Some("a2")
            );
        }
    }
}
