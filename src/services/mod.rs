pub mod game_data;
pub mod notifier;
pub mod repository;
pub mod startup;
pub mod update_job;
pub mod updater;
