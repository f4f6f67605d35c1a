//! Remote media downloads
//!
//! A download is attempted once per [`ClientProfile`] until the upstream
//! host accepts one of them; see [`strategy`].

mod profiles;
pub mod strategy;
mod ytdlp;

pub use profiles::ClientProfile;
pub use strategy::{IsRejection, NoProfiles, try_profiles};
pub use ytdlp::{
    DownloadError, DownloadRequest, DownloadedMedia, MediaDownloader, MediaFormat, YtDlpDownloader,
    download_media, sanitize_title,
};
