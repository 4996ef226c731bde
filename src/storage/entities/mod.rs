pub mod conversations;
pub mod faqs;
pub mod messages;
