//! The loader vocabulary a host bundler understands for loaded contents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MdxBundlerError;

/// How the host bundler should interpret the contents returned by a load hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    Js,
    Jsx,
    Ts,
    Tsx,
    Json,
    Css,
    Text,
    Base64,
    #[serde(rename = "dataurl")]
    DataUrl,
    File,
    Binary,
    Copy,
    Empty,
    Default,
}

impl Loader {
    pub fn as_str(&self) -> &'static str {
        match self {
            Loader::Js => "js",
            Loader::Jsx => "jsx",
            Loader::Ts => "ts",
            Loader::Tsx => "tsx",
            Loader::Json => "json",
            Loader::Css => "css",
            Loader::Text => "text",
            Loader::Base64 => "base64",
            Loader::DataUrl => "dataurl",
            Loader::File => "file",
            Loader::Binary => "binary",
            Loader::Copy => "copy",
            Loader::Empty => "empty",
            Loader::Default => "default",
        }
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Loader {
    type Err = MdxBundlerError;

    /// Treats `tag` as a loader name, which is how a bare file extension is
    /// interpreted when no override is declared for it.
    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let loader = match tag {
            "js" => Loader::Js,
            "jsx" => Loader::Jsx,
            "ts" => Loader::Ts,
            "tsx" => Loader::Tsx,
            "json" => Loader::Json,
            "css" => Loader::Css,
            "text" => Loader::Text,
            "base64" => Loader::Base64,
            "dataurl" => Loader::DataUrl,
            "file" => Loader::File,
            "binary" => Loader::Binary,
            "copy" => Loader::Copy,
            "empty" => Loader::Empty,
            "default" => Loader::Default,
            _ => {
                return Err(MdxBundlerError::UnsupportedLoader {
                    extension: tag.to_string(),
                })
            }
        };
        Ok(loader)
    }
}
