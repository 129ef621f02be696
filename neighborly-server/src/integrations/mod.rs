//! Third-party HTTP integrations: transactional email and GIF search

pub mod email;
pub mod gifs;

pub use email::{EmailMessage, HttpMailer, LogMailer, Mailer, MailerError, MemoryMailer};
pub use gifs::{DisabledGifs, Gif, GifError, GifProvider, HttpGifProvider};
