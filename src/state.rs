use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::Config;
use crate::repository::Store;
use crate::services::{
    access::AccessControl, analytics::AnalyticsService, mock_exam::MockExamEngine,
    practice::PracticeService, sampler::QuestionSampler, streak::StreakTracker,
    subscription::SubscriptionService,
};

/// Services are built once at start-up and shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<MockExamEngine>,
    pub practice: Arc<PracticeService>,
    pub streaks: Arc<StreakTracker>,
    pub analytics: Arc<AnalyticsService>,
    pub subscriptions: Arc<SubscriptionService>,
}

impl AppState {
    pub fn new<S: Store>(config: Config, store: Arc<S>) -> Self {
        let access = Arc::new(AccessControl::new(
            store.clone(),
            store.clone(),
            config.free_tier,
        ));
        let sampler = Arc::new(QuestionSampler::new(store.clone()));
        let streaks = Arc::new(StreakTracker::new(store.clone(), config.streak_repair_cost));

        let engine = Arc::new(MockExamEngine::new(
            store.clone(),
            store.clone(),
            sampler.clone(),
            access.clone(),
        ));
        let practice = Arc::new(PracticeService::new(
            store.clone(),
            store.clone(),
            sampler,
            access.clone(),
            streaks.clone(),
        ));
        let analytics = Arc::new(AnalyticsService::new(
            store.clone(),
            store.clone(),
            store.clone(),
        ));
        let subscriptions = Arc::new(SubscriptionService::new(store, access));

        Self {
            config,
            engine,
            practice,
            streaks,
            analytics,
            subscriptions,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
