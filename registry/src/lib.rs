use std::sync::Arc;

use adapter::database::ConnectionPool;
use adapter::notifier::NotificationDispatcherImpl;
use adapter::repository::{
    book::BookRepositoryImpl, health::HealthCheckRepositoryImpl, loan::LoanRepositoryImpl,
    renewal::RenewalRequestRepositoryImpl, reservation::ReservationRepositoryImpl,
    user::UserRepositoryImpl,
};
use kernel::notifier::NotificationDispatcher;
use kernel::repository::book::BookRepository;
use kernel::repository::health::HealthCheckRepository;
use kernel::repository::loan::LoanRepository;
use kernel::repository::renewal::RenewalRequestRepository;
use kernel::repository::reservation::ReservationRepository;
use kernel::repository::user::UserRepository;
use shared::config::AppConfig;

#[derive(Clone)]
pub struct AppRegistry {
    health_check_repository: Arc<dyn HealthCheckRepository>,
    book_repository: Arc<dyn BookRepository>,
    loan_repository: Arc<dyn LoanRepository>,
    renewal_request_repository: Arc<dyn RenewalRequestRepository>,
    reservation_repository: Arc<dyn ReservationRepository>,
    user_repository: Arc<dyn UserRepository>,
    notification_dispatcher: Arc<dyn NotificationDispatcher>,
}

impl AppRegistry {
    pub fn new(pool: ConnectionPool, app_config: AppConfig) -> Self {
        let health_check_repository = Arc::new(HealthCheckRepositoryImpl::new(pool.clone()));
        let book_repository = Arc::new(BookRepositoryImpl::new(pool.clone()));
        let loan_repository = Arc::new(LoanRepositoryImpl::new(pool.clone()));
        let renewal_request_repository = Arc::new(RenewalRequestRepositoryImpl::new(pool.clone()));
        let reservation_repository = Arc::new(ReservationRepositoryImpl::new(pool.clone()));
        let user_repository = Arc::new(UserRepositoryImpl::new(pool.clone()));
        let notification_dispatcher =
            Arc::new(NotificationDispatcherImpl::new(&app_config.notifier));
        Self {
            health_check_repository,
            book_repository,
            loan_repository,
            renewal_request_repository,
            reservation_repository,
            user_repository,
            notification_dispatcher,
        }
    }

    pub fn health_check_repository(&self) -> Arc<dyn HealthCheckRepository> {
        self.health_check_repository.clone()
    }

    pub fn book_repository(&self) -> Arc<dyn BookRepository> {
        self.book_repository.clone()
    }

    pub fn loan_repository(&self) -> Arc<dyn LoanRepository> {
        self.loan_repository.clone()
    }

    pub fn renewal_request_repository(&self) -> Arc<dyn RenewalRequestRepository> {
        self.renewal_request_repository.clone()
    }

    pub fn reservation_repository(&self) -> Arc<dyn ReservationRepository> {
        self.reservation_repository.clone()
    }

    pub fn user_repository(&self) -> Arc<dyn UserRepository> {
        self.user_repository.clone()
    }

    pub fn notification_dispatcher(&self) -> Arc<dyn NotificationDispatcher> {
        self.notification_dispatcher.clone()
    }
}
