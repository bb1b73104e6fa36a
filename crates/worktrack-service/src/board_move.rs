use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};
use worktrack_core::board::{Board, BoardScope, BoardWorkItem, ColumnIndex, MoveWorkItem};

use crate::cache::{QueryCache, QueryKey};
use crate::{ServiceError, TrackerService};

/// Moves allowed in flight for a single work item.
pub const MAX_IN_FLIGHT_MOVES_PER_ITEM: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Source and target column are the same.
    Unchanged,
    /// The item already has a move in flight; nothing was patched or sent.
    Dropped,
    Moved,
}

/// A move whose optimistic patch is applied but whose request has not been
/// sent yet.
#[derive(Debug, Clone)]
pub struct PendingMove {
    key: QueryKey,
    previous: BoardWorkItem,
    request: MoveWorkItem,
}

impl PendingMove {
    pub fn item_id(&self) -> i64 {
        self.request.id
    }

    pub fn request(&self) -> &MoveWorkItem {
        &self.request
    }
}

#[derive(Debug)]
pub enum BeginMove {
    Unchanged,
    Dropped,
    Started(PendingMove),
}

/// Optimistic work item moves against the cached board.
///
/// A move is split into `begin`, which patches the cache synchronously, and
/// `finish`, which sends the request and settles. Callers that want both use
/// `move_item`.
#[derive(Default)]
pub struct BoardMover {
    in_flight: Mutex<HashSet<(BoardScope, i64)>>,
}

impl BoardMover {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<(BoardScope, i64)>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_in_flight(&self, scope: &BoardScope, item_id: i64) -> bool {
        self.lock().contains(&(scope.clone(), item_id))
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().len()
    }

    pub fn begin(
        &self,
        cache: &QueryCache,
        scope: &BoardScope,
        item_id: i64,
        target_column_id: &str,
    ) -> Result<BeginMove, ServiceError> {
        let key = QueryKey::Board(scope.clone());
        let board: Board = cache
            .get(&key)
            .ok_or_else(|| ServiceError::NotFound(format!("board for {}", scope.project)))?;
        let index = ColumnIndex::new(&board.columns);
        let item = board
            .item(item_id)
            .ok_or_else(|| ServiceError::NotFound(format!("work item {item_id}")))?;
        let target = index
            .get(target_column_id)
            .ok_or_else(|| ServiceError::InvalidInput(format!("unknown column {target_column_id}")))?;

        if index.resolve(item).map(|c| c.id.as_str()) == Some(target.id.as_str()) {
            return Ok(BeginMove::Unchanged);
        }

        {
            let mut in_flight = self.lock();
            let slot = (scope.clone(), item_id);
            let pending = usize::from(in_flight.contains(&slot));
            if pending >= MAX_IN_FLIGHT_MOVES_PER_ITEM {
                debug!(item_id, "move already in flight, dropping");
                return Ok(BeginMove::Dropped);
            }
            in_flight.insert(slot);
        }

        let target_name = target.name.clone();
        let patched = cache.modify(&key, |b: &mut Board| b.apply_move(item_id, target_column_id));
        let previous = match patched {
            Some(Ok(previous)) => previous,
            Some(Err(e)) => {
                self.release(scope, item_id);
                return Err(e.into());
            }
            None => {
                self.release(scope, item_id);
                return Err(ServiceError::NotFound(format!("board for {}", scope.project)));
            }
        };

        Ok(BeginMove::Started(PendingMove {
            key,
            previous,
            request: MoveWorkItem {
                id: item_id,
                target_column: target_name,
                scope: scope.clone(),
            },
        }))
    }

    /// Send the move. On failure only the moved item is restored; the board
    /// query is invalidated either way.
    pub async fn finish(
        &self,
        service: &dyn TrackerService,
        cache: &QueryCache,
        pending: PendingMove,
    ) -> Result<(), ServiceError> {
        let PendingMove {
            key,
            previous,
            request,
        } = pending;
        let result = service.move_work_item(&request).await;

        match &result {
            Ok(()) => info!(
                item_id = request.id,
                column = %request.target_column,
                "moved work item"
            ),
            Err(e) => {
                warn!(item_id = request.id, "move failed, restoring item: {e}");
                cache.modify(&key, |b: &mut Board| b.restore_item(previous));
            }
        }

        self.release(&request.scope, request.id);
        cache.invalidate(&key);
        result
    }

    pub async fn move_item(
        &self,
        service: &dyn TrackerService,
        cache: &QueryCache,
        scope: &BoardScope,
        item_id: i64,
        target_column_id: &str,
    ) -> Result<MoveOutcome, ServiceError> {
        match self.begin(cache, scope, item_id, target_column_id)? {
            BeginMove::Unchanged => Ok(MoveOutcome::Unchanged),
            BeginMove::Dropped => Ok(MoveOutcome::Dropped),
            BeginMove::Started(pending) => {
                self.finish(service, cache, pending).await?;
                Ok(MoveOutcome::Moved)
            }
        }
    }

    fn release(&self, scope: &BoardScope, item_id: i64) {
        self.lock().remove(&(scope.clone(), item_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worktrack_core::board::{BoardColumn, BoardState};

    fn scope() -> BoardScope {
        BoardScope::new("acme", "web")
    }

    fn cached_board() -> QueryCache {
        let columns = vec![
            BoardColumn {
                id: "c1".into(),
                name: "New".into(),
                order: 0,
            },
            BoardColumn {
                id: "c2".into(),
                name: "Active".into(),
                order: 1,
            },
            BoardColumn {
                id: "c3".into(),
                name: "Closed".into(),
                order: 2,
            },
        ];
        let items = [(1, "c1"), (2, "c2")]
            .into_iter()
            .map(|(id, col)| BoardWorkItem {
                id,
                title: format!("item {id}"),
                work_item_type: "Task".into(),
                board_column_id: Some(col.into()),
                board_column_name: None,
                board_state: None,
                assigned_to: None,
                priority: None,
                tags: Default::default(),
                pull_requests: vec![],
                url: None,
            })
            .collect();
        let cache = QueryCache::default();
        cache.set(&QueryKey::Board(scope()), &Board { columns, items });
        cache
    }

    #[test]
    fn same_column_is_unchanged() {
        let cache = cached_board();
        let mover = BoardMover::new();
        let outcome = mover.begin(&cache, &scope(), 1, "c1").unwrap();
        assert!(matches!(outcome, BeginMove::Unchanged));
        assert_eq!(mover.in_flight_count(), 0);
    }

    #[test]
    fn begin_patches_cache_before_any_request() {
        let cache = cached_board();
        let mover = BoardMover::new();
        let BeginMove::Started(pending) = mover.begin(&cache, &scope(), 1, "c3").unwrap() else {
            panic!("expected a started move");
        };
        assert_eq!(pending.request().target_column, "Closed");
        assert_eq!(pending.request().scope, scope());

        let board: Board = cache.get(&QueryKey::Board(scope())).unwrap();
        let item = board.item(1).unwrap();
        assert_eq!(item.board_column_id.as_deref(), Some("c3"));
        assert_eq!(item.board_state, Some(BoardState::Done));
        assert!(mover.is_in_flight(&scope(), 1));
    }

    #[test]
    fn second_move_while_in_flight_is_dropped_without_patch() {
        let cache = cached_board();
        let mover = BoardMover::new();
        let first = mover.begin(&cache, &scope(), 1, "c2").unwrap();
        assert!(matches!(first, BeginMove::Started(_)));

        let second = mover.begin(&cache, &scope(), 1, "c3").unwrap();
        assert!(matches!(second, BeginMove::Dropped));
        let board: Board = cache.get(&QueryKey::Board(scope())).unwrap();
        assert_eq!(board.item(1).unwrap().board_column_id.as_deref(), Some("c2"));
    }

    #[test]
    fn unknown_target_column_is_rejected() {
        let cache = cached_board();
        let mover = BoardMover::new();
        let err = mover.begin(&cache, &scope(), 1, "nope").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(mover.in_flight_count(), 0);
    }

    #[test]
    fn missing_board_is_not_found() {
        let cache = QueryCache::default();
        let err = BoardMover::new()
            .begin(&cache, &scope(), 1, "c2")
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
