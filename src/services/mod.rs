pub mod achievements;
pub mod activity;
pub mod missions;
pub mod notifications;
pub mod streaks;

pub use achievements::AchievementService;
pub use activity::ActivityService;
pub use missions::MissionService;
pub use notifications::NotificationService;
pub use streaks::StreakService;
