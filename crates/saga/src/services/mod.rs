//! Collaborator service traits and in-memory implementations used by the
//! reference workflows.

pub mod articles;
pub mod comments;
pub mod notification;
pub mod statistics;

pub use articles::{Article, ArticleRepository, ArticleStatus, InMemoryArticleRepository};
pub use comments::{Comment, CommentRepository, InMemoryCommentRepository};
pub use notification::{InMemoryNotificationService, Notification, NotificationService};
pub use statistics::{InMemoryStatisticsService, StatisticsService};
