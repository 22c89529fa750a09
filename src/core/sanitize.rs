//! 对象 key 到本地相对路径的映射

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

/// 替换保留字符使用的填充字符
pub const FILLER: &str = "_";

/// 部分文件系统上非法的字符（不含路径分隔符 `/`）
pub const RESERVED_CHARS: [char; 10] = ['?', '<', '>', ':', '"', '\\', '|', '*', ',', ' '];

static RESERVED: LazyLock<Regex> = LazyLock::new(|| {
    let class: String = RESERVED_CHARS
        .iter()
        .map(|c| regex::escape(&c.to_string()))
        .collect();
    Regex::new(&format!("[{}]", class)).expect("reserved character class is a valid regex")
});

/// 把远程 key 转成文件系统安全的相对路径
///
/// 纯函数：同一个 key 总是得到同一个结果。不同 key 可能映射到同一路径，
/// 这种冲突不做处理。
pub fn sanitize_key(key: &str) -> String {
    RESERVED.replace_all(key, FILLER).into_owned()
}

/// 拼出 key 在目标根目录下的相对路径
///
/// 空段、`.` 和 `..` 会被丢弃，结果不会逃出目标根目录。
pub fn relative_path(key: &str) -> PathBuf {
    sanitize_key(key)
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_reserved_chars() {
        assert_eq!(sanitize_key("report:2024?.csv"), "report_2024_.csv");
        assert_eq!(sanitize_key(r#"a<b>c"d\e|f*g,h i"#), "a_b_c_d_e_f_g_h_i");
    }

    #[test]
    fn test_keeps_separators() {
        assert_eq!(sanitize_key("a/b c/d.txt"), "a/b_c/d.txt");
        assert_eq!(relative_path("a/b.txt"), PathBuf::from("a").join("b.txt"));
    }

    #[test]
    fn test_deterministic_and_clean() {
        let keys = ["x?y", "über/ß:1", "", "***", "dir/ sub /file"];
        for key in keys {
            let first = sanitize_key(key);
            assert_eq!(first, sanitize_key(key));
            assert!(!first.chars().any(|c| RESERVED_CHARS.contains(&c)));
        }
    }

    #[test]
    fn test_collisions_not_resolved() {
        assert_eq!(sanitize_key("a:b"), sanitize_key("a?b"));
    }

    #[test]
    fn test_relative_path_stays_inside_root() {
        assert_eq!(relative_path("../../etc/passwd"), PathBuf::from("etc").join("passwd"));
        assert_eq!(relative_path("/a//./b"), PathBuf::from("a").join("b"));
        assert_eq!(relative_path(""), PathBuf::new());
    }
}
