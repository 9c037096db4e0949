//! In-memory repository of the simulated cluster state. In k8s etcd plays this role, here it is a
//! single owned snapshot which is never mutated in place: every write clones the current snapshot,
//! applies the change and publishes the result by swapping the reference. A reader holding an
//! `Rc<ClusterSnapshot>` therefore never observes a half-applied change.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, error};

use crate::core::cluster::ClusterSnapshot;

type Subscriber = Box<dyn FnMut(u64, &Rc<ClusterSnapshot>)>;

pub struct ClusterRepository {
    current: Rc<ClusterSnapshot>,
    // Last snapshot recorded as known-good, used to bootstrap workloads scaled from zero pods.
    known_good: Rc<ClusterSnapshot>,
    // Incremented on every published snapshot.
    version: u64,
    subscribers: Vec<Subscriber>,
}

impl Default for ClusterRepository {
    fn default() -> Self {
        Self::new(ClusterSnapshot::default())
    }
}

impl ClusterRepository {
    pub fn new(initial: ClusterSnapshot) -> Self {
        let initial = Rc::new(initial);
        Self {
            current: initial.clone(),
            known_good: initial,
            version: 0,
            subscribers: Default::default(),
        }
    }

    /// Read-only accessor for consumers.
    pub fn snapshot(&self) -> Rc<ClusterSnapshot> {
        self.current.clone()
    }

    pub fn known_good(&self) -> Rc<ClusterSnapshot> {
        self.known_good.clone()
    }

    pub fn mark_known_good(&mut self) {
        self.known_good = self.current.clone();
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Subscriber is called with the version and the snapshot after every publish.
    pub fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    /// Atomic read-compute-replace on an exclusively owned repository.
    pub fn update<F, R>(&mut self, change: F) -> R
    where
        F: FnOnce(&mut ClusterSnapshot) -> R,
    {
        let mut next = (*self.current).clone();
        let result = change(&mut next);
        self.replace(next);
        self.notify_subscribers();
        result
    }

    /// Atomic read-compute-replace on a shared repository. Neither the change nor the subscribers
    /// run under a borrow of the repository, so both may read it.
    pub fn update_shared<F, R>(repository: &RefCell<Self>, change: F) -> R
    where
        F: FnOnce(&mut ClusterSnapshot) -> R,
    {
        let mut next = (*repository.borrow().current).clone();
        let result = change(&mut next);
        repository.borrow_mut().replace(next);

        let (version, snapshot, mut subscribers) = {
            let mut repository = repository.borrow_mut();
            let subscribers = std::mem::take(&mut repository.subscribers);
            (repository.version, repository.current.clone(), subscribers)
        };
        for subscriber in subscribers.iter_mut() {
            subscriber(version, &snapshot);
        }
        // subscribers added from a callback go after the existing ones
        let mut repository = repository.borrow_mut();
        subscribers.append(&mut repository.subscribers);
        repository.subscribers = subscribers;
        result
    }

    /// Publishes `next` without notifying subscribers. The snapshot is also recorded as known-good
    /// when it is healthy: no invariant is violated and every deployment has a running member.
    pub fn replace(&mut self, next: ClusterSnapshot) {
        let violations = next.invariant_violations();
        if !violations.is_empty() {
            error!("Cluster invariants violated: {:?}", violations);
        }
        debug_assert!(
            violations.is_empty(),
            "cluster invariants violated: {:?}",
            violations
        );
        let healthy = violations.is_empty() && next.every_deployment_has_running_member();

        self.current = Rc::new(next);
        self.version += 1;
        debug!("Published cluster snapshot version {}", self.version);
        if healthy {
            self.known_good = self.current.clone();
        }
    }

    fn notify_subscribers(&mut self) {
        for subscriber in self.subscribers.iter_mut() {
            subscriber(self.version, &self.current);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::ClusterRepository;
    use crate::core::deployment::Deployment;
    use crate::core::node::Node;

    #[test]
    fn test_update_swaps_snapshot_and_keeps_old_readers_intact() {
        let mut repository = ClusterRepository::default();
        let before = repository.snapshot();

        repository.update(|cluster| {
            cluster
                .nodes
                .insert("node_1".to_string(), Node::new("node_1", 1000, 1024));
        });

        assert!(before.nodes.is_empty());
        assert_eq!(1, repository.snapshot().nodes.len());
        assert_eq!(1, repository.version());
        // nodes only, nothing keeps it from being known-good
        assert_eq!(1, repository.known_good().nodes.len());
    }

    #[test]
    fn test_known_good_skips_deployments_without_running_members() {
        let mut repository = ClusterRepository::default();
        repository.update(|cluster| {
            cluster
                .nodes
                .insert("node_1".to_string(), Node::new("node_1", 1000, 1024));
        });
        repository.update(|cluster| {
            cluster
                .deployments
                .insert("web".to_string(), Deployment::new("web", 0, Default::default()));
        });

        assert_eq!(2, repository.version());
        assert!(repository.known_good().deployments.is_empty());

        repository.mark_known_good();
        assert_eq!(1, repository.known_good().deployments.len());
    }

    #[test]
    fn test_subscribers_see_every_version() {
        let seen = Rc::new(RefCell::new(vec![]));
        let mut repository = ClusterRepository::default();
        let seen_clone = seen.clone();
        repository.subscribe(Box::new(move |version, snapshot| {
            seen_clone.borrow_mut().push((version, snapshot.nodes.len()));
        }));

        repository.update(|cluster| {
            cluster
                .nodes
                .insert("node_1".to_string(), Node::new("node_1", 1000, 1024));
        });
        repository.update(|cluster| {
            cluster.nodes.clear();
        });

        assert_eq!(vec![(1, 1), (2, 0)], *seen.borrow());
    }

    #[test]
    fn test_shared_update_lets_subscribers_read_the_repository() {
        let repository = Rc::new(RefCell::new(ClusterRepository::default()));
        let seen = Rc::new(RefCell::new(vec![]));

        let weak = Rc::downgrade(&repository);
        let seen_clone = seen.clone();
        repository.borrow_mut().subscribe(Box::new(move |version, _| {
            let repository = weak.upgrade().unwrap();
            let current = repository.borrow().version();
            seen_clone.borrow_mut().push((version, current));
        }));

        let nodes = ClusterRepository::update_shared(&repository, |cluster| {
            cluster
                .nodes
                .insert("node_1".to_string(), Node::new("node_1", 1000, 1024));
            cluster.nodes.len()
        });

        assert_eq!(1, nodes);
        assert_eq!(vec![(1, 1)], *seen.borrow());
        // subscriber survived the call
        ClusterRepository::update_shared(&repository, |cluster| cluster.nodes.clear());
        assert_eq!(vec![(1, 1), (2, 2)], *seen.borrow());
    }
}
