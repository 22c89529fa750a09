//! 元数据旁路文件
//!
//! 每个目标目录最多写一次 `details.txt`，第一个落到该目录的对象决定其内容，
//! 之后的对象即使元数据不同也不会修改它。

use crate::error::SyncError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// 旁路文件名
pub const SIDECAR_NAME: &str = "details.txt";

/// 旁路文件写入器
#[derive(Debug, Clone, Copy)]
pub struct SidecarWriter {
    decode_headers: bool,
}

impl Default for SidecarWriter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SidecarWriter {
    pub fn new(decode_headers: bool) -> Self {
        Self { decode_headers }
    }

    pub fn sidecar_path(dir: &Path) -> PathBuf {
        dir.join(SIDECAR_NAME)
    }

    /// 生成文件内容：每行 `key: value`，按 key 排序
    pub fn render(&self, metadata: &HashMap<String, String>) -> String {
        let mut lines: Vec<(String, String)> = metadata
            .iter()
            .map(|(k, v)| (k.trim().to_string(), self.header_value(v)))
            .collect();
        lines.sort();

        lines
            .into_iter()
            .map(|(k, v)| format!("{}: {}\n", k, v))
            .collect()
    }

    fn header_value(&self, raw: &str) -> String {
        if !self.decode_headers {
            return raw.trim().to_string();
        }
        match decode_header(raw) {
            Ok(decoded) => decoded.trim().to_string(),
            Err(e) => {
                warn!("{}，使用原始值", e);
                raw.trim().to_string()
            }
        }
    }

    /// 目录下还没有旁路文件时写入，返回是否写入了新文件
    pub async fn write_once(
        &self,
        dir: &Path,
        metadata: &HashMap<String, String>,
    ) -> Result<bool, SyncError> {
        let path = Self::sidecar_path(dir);

        match fs::try_exists(&path).await {
            Ok(true) => {
                debug!("旁路文件已存在: {:?}", path);
                return Ok(false);
            }
            Ok(false) => {}
            Err(e) => return Err(SyncError::write(&path, e)),
        }

        // create_new 保证并发写同一目录时只有一个成功
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(SyncError::write(&path, e)),
        };

        let content = self.render(metadata);
        if let Err(e) = write_synced(&mut file, content.as_bytes()).await {
            let _ = fs::remove_file(&path).await;
            return Err(SyncError::write(&path, e));
        }

        debug!("写入旁路文件: {:?} ({} 项)", path, metadata.len());
        Ok(true)
    }
}

async fn write_synced(file: &mut fs::File, content: &[u8]) -> std::io::Result<()> {
    file.write_all(content).await?;
    file.sync_all().await
}

/// 解码 RFC 2047 编码字（`=?charset?B|Q?text?=`）
///
/// 相邻编码字之间只有空白时空白被丢弃；结构不完整的片段按原样保留。
/// 未知字符集或内容无法解码时返回错误。
pub fn decode_header(value: &str) -> Result<String, SyncError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        match EncodedWord::parse(candidate) {
            Some((word, consumed)) => {
                if !(after_word && before.chars().all(char::is_whitespace)) {
                    out.push_str(before);
                }
                out.push_str(&word.decode().map_err(|reason| SyncError::MetadataDecode {
                    value: value.to_string(),
                    reason,
                })?);
                rest = &candidate[consumed..];
                after_word = true;
            }
            None => {
                out.push_str(before);
                out.push_str("=?");
                rest = &candidate[2..];
                after_word = false;
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}

struct EncodedWord<'a> {
    charset: &'a str,
    encoding: u8,
    text: &'a str,
}

impl<'a> EncodedWord<'a> {
    /// 从 `=?` 开始解析一个编码字，返回编码字和消耗的字节数
    fn parse(s: &'a str) -> Option<(Self, usize)> {
        let body = s.strip_prefix("=?")?;
        let charset_end = body.find('?')?;
        let charset = &body[..charset_end];

        let after_charset = &body[charset_end + 1..];
        let bytes = after_charset.as_bytes();
        if bytes.len() < 2 || bytes[1] != b'?' || !bytes[0].is_ascii_alphabetic() {
            return None;
        }
        let encoding = bytes[0].to_ascii_uppercase();

        let text_area = &after_charset[2..];
        let text_end = text_area.find("?=")?;
        let text = &text_area[..text_end];

        if charset.is_empty() || text.contains(char::is_whitespace) {
            return None;
        }

        let consumed = 2 + charset_end + 1 + 2 + text_end + 2;
        Some((
            Self {
                charset,
                encoding,
                text,
            },
            consumed,
        ))
    }

    fn decode(&self) -> Result<String, String> {
        let raw = match self.encoding {
            b'B' => STANDARD
                .decode(self.text)
                .map_err(|e| format!("base64 解码失败: {}", e))?,
            b'Q' => q_decode(self.text)?,
            other => return Err(format!("未知编码方式: {}", other as char)),
        };

        // RFC 2231 允许在字符集后附加语言标记
        let label = self.charset.split('*').next().unwrap_or_default();
        let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
            .ok_or_else(|| format!("未知字符集: {}", self.charset))?;

        encoding
            .decode_without_bom_handling_and_without_replacement(&raw)
            .map(|text| text.into_owned())
            .ok_or_else(|| format!("内容不是有效的 {} 文本", self.charset))
    }
}

fn q_decode(text: &str) -> Result<Vec<u8>, String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| format!("无效的 Q 编码: {}", text))?;
                out.push(hex);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }

    Ok(out)
}
