pub mod businesses;
pub mod customers;
pub mod extraction;
pub mod notifications;
pub mod payments;
pub mod whatsapp;
