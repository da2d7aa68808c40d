pub mod check;
pub mod keymap;
pub mod message;
pub mod tracker;
pub mod transpose;
