pub mod call;
pub mod form;
pub mod health;
pub mod instructions;
