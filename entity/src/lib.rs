pub mod action;
pub mod manager;
pub mod pipeline;

pub mod prelude {
    pub use super::action::Entity as Action;
    pub use super::manager::Entity as Manager;
    pub use super::pipeline::Entity as Pipeline;
}
