//! 机器人指令与遥测
//!
//! 下行：每条指令恰好一个 ASCII 字节，取值 `L` `O` `H` `S` `D`。
//! 没有帧头、序号或应答。
//!
//! 上行：notify 特征推送 UTF-8 文本。以 `DIST:` 开头的消息携带距离值
//! （单位 cm），其余文本原样追加到状态日志。

use crate::error::RobotError;
use std::fmt;
use std::str::FromStr;

/// 距离消息前缀
pub const DISTANCE_PREFIX: &str = "DIST:";

/// 机器人模式指令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    LineFollow,
    ObstacleAvoid,
    HandFollow,
    Stop,
    QueryDistance,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::LineFollow,
        Command::ObstacleAvoid,
        Command::HandFollow,
        Command::Stop,
        Command::QueryDistance,
    ];

    /// 写入特征的单字节负载
    pub fn byte(self) -> u8 {
        match self {
            Command::LineFollow => b'L',
            Command::ObstacleAvoid => b'O',
            Command::HandFollow => b'H',
            Command::Stop => b'S',
            Command::QueryDistance => b'D',
        }
    }

    /// 发送后显示的状态文本
    pub fn label(self) -> &'static str {
        match self {
            Command::LineFollow => "Line Following",
            Command::ObstacleAvoid => "Obstacle Avoidance",
            Command::HandFollow => "Hand Following",
            Command::Stop => "Stopped",
            Command::QueryDistance => "Querying Distance",
        }
    }

    /// 按钮上的短名称
    pub fn name(self) -> &'static str {
        match self {
            Command::LineFollow => "Line Follow",
            Command::ObstacleAvoid => "Obstacle Avoid",
            Command::HandFollow => "Hand Follow",
            Command::Stop => "Stop",
            Command::QueryDistance => "Distance",
        }
    }

    /// TUI 快捷键（指令字节的小写形式）
    pub fn key(self) -> char {
        char::from(self.byte()).to_ascii_lowercase()
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte.to_ascii_uppercase() {
            b'L' => Some(Command::LineFollow),
            b'O' => Some(Command::ObstacleAvoid),
            b'H' => Some(Command::HandFollow),
            b'S' => Some(Command::Stop),
            b'D' => Some(Command::QueryDistance),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), char::from(self.byte()))
    }
}

impl FromStr for Command {
    type Err = RobotError;

    /// 接受单个字母（不区分大小写）或指令名称
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let [byte] = trimmed.as_bytes()
            && let Some(cmd) = Command::from_byte(*byte)
        {
            return Ok(cmd);
        }

        match trimmed.to_ascii_lowercase().replace('_', "-").as_str() {
            "line" | "line-follow" | "line-following" => Ok(Command::LineFollow),
            "obstacle" | "obstacle-avoid" | "obstacle-avoidance" => Ok(Command::ObstacleAvoid),
            "hand" | "hand-follow" | "hand-following" => Ok(Command::HandFollow),
            "stop" => Ok(Command::Stop),
            "distance" | "dist" | "query-distance" => Ok(Command::QueryDistance),
            _ => Err(RobotError::UnknownCommand(s.to_string())),
        }
    }
}

/// 一条 notify 消息
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    /// `DIST:<value>`，`raw` 保留原文，`cm` 为可解析时的数值
    Distance { raw: String, cm: Option<f32> },
    /// 其他文本
    Text(String),
}

impl Telemetry {
    /// 解码 notify 负载
    ///
    /// 非法 UTF-8 按替换字符处理，首尾空白（包括机器人发送的 `\r\n`）会被去掉。
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload).trim().to_string();

        match text.strip_prefix(DISTANCE_PREFIX) {
            Some(rest) => {
                let raw = rest.to_string();
                let cm = raw.trim().parse::<f32>().ok();
                Telemetry::Distance { raw, cm }
            }
            None => Telemetry::Text(text),
        }
    }

    /// 追加到状态日志的文本（始终是完整消息）
    pub fn text(&self) -> String {
        match self {
            Telemetry::Distance { raw, .. } => format!("{DISTANCE_PREFIX}{raw}"),
            Telemetry::Text(text) => text.clone(),
        }
    }

    /// 距离面板文本，非距离消息返回 `None`
    pub fn distance_display(&self) -> Option<String> {
        match self {
            Telemetry::Distance { raw, .. } => Some(format!("Distance: {raw} cm")),
            Telemetry::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        let bytes: Vec<u8> = Command::ALL.iter().map(|c| c.byte()).collect();
        assert_eq!(bytes, b"LOHSD");
    }

    #[test]
    fn test_command_labels() {
        assert_eq!(Command::LineFollow.label(), "Line Following");
        assert_eq!(Command::ObstacleAvoid.label(), "Obstacle Avoidance");
        assert_eq!(Command::HandFollow.label(), "Hand Following");
        assert_eq!(Command::Stop.label(), "Stopped");
        assert_eq!(Command::QueryDistance.label(), "Querying Distance");
    }

    #[test]
    fn test_command_from_str() {
        assert_eq!("L".parse::<Command>().unwrap(), Command::LineFollow);
        assert_eq!("o".parse::<Command>().unwrap(), Command::ObstacleAvoid);
        assert_eq!("hand".parse::<Command>().unwrap(), Command::HandFollow);
        assert_eq!("Stop".parse::<Command>().unwrap(), Command::Stop);
        assert_eq!(
            "query_distance".parse::<Command>().unwrap(),
            Command::QueryDistance
        );
        assert!(matches!(
            "x".parse::<Command>(),
            Err(RobotError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_command_keys_are_unique() {
        let keys: Vec<char> = Command::ALL.iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec!['l', 'o', 'h', 's', 'd']);
    }

    #[test]
    fn test_parse_distance() {
        let t = Telemetry::parse(b"DIST:123.4\r\n");
        assert_eq!(
            t,
            Telemetry::Distance {
                raw: "123.4".to_string(),
                cm: Some(123.4)
            }
        );
        assert_eq!(t.distance_display().unwrap(), "Distance: 123.4 cm");
        assert_eq!(t.text(), "DIST:123.4");
    }

    #[test]
    fn test_parse_distance_non_numeric() {
        let t = Telemetry::parse(b"DIST:far");
        assert_eq!(t.distance_display().unwrap(), "Distance: far cm");
        assert!(matches!(t, Telemetry::Distance { cm: None, .. }));
    }

    #[test]
    fn test_parse_text() {
        let t = Telemetry::parse(b"  mode=line \n");
        assert_eq!(t, Telemetry::Text("mode=line".to_string()));
        assert!(t.distance_display().is_none());
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        assert!(matches!(Telemetry::parse(b"dist:5"), Telemetry::Text(_)));
    }

    #[test]
    fn test_parse_invalid_utf8() {
        let t = Telemetry::parse(&[0x44, 0xff, 0x41]);
        assert_eq!(t.text(), "D\u{fffd}A");
    }
}
