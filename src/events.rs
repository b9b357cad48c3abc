// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 目标事件消息 (每 message_rate 帧生成一次)

use std::sync::Arc;

use serde::Serialize;

use crate::detection::{BoxRect, DetectedObject, FrameMeta};

/// 按类别附带的扩展信息
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectExtension {
    Vehicle {
        vehicle_type: String,
        make: String,
        model: String,
        color: String,
        license: String,
        region: String,
    },
    Person {
        age: u32,
        gender: String,
        hair: String,
        cap: String,
        apparel: String,
    },
    Product {
        brand: String,
        product_type: String,
        shape: String,
    },
    Unknown,
}

impl ObjectExtension {
    /// 根据类别名称选择扩展类型, 字段留空由下游分类器填写
    pub fn for_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "person" | "pedestrian" | "face" => ObjectExtension::Person {
                age: 0,
                gender: String::new(),
                hair: String::new(),
                cap: String::new(),
                apparel: String::new(),
            },
            "car" | "vehicle" | "truck" | "bus" | "motorcycle" | "bicycle" => {
                ObjectExtension::Vehicle {
                    vehicle_type: label.to_string(),
                    make: String::new(),
                    model: String::new(),
                    color: String::new(),
                    license: String::new(),
                    region: String::new(),
                }
            }
            "product" | "bottle" | "package" => ObjectExtension::Product {
                brand: String::new(),
                product_type: label.to_string(),
                shape: String::new(),
            },
            _ => ObjectExtension::Unknown,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventMessage {
    pub sensor_id: usize,
    pub frame_id: i64,
    pub timestamp: String,
    pub object_label: String,
    pub tracking_id: u64,
    pub confidence: f32,
    /// 原始视频分辨率下的检测框
    pub bbox: BoxRect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Arc<[f32]>>,
    pub extension: ObjectExtension,
}

impl EventMessage {
    pub fn from_object(
        frame: &FrameMeta,
        obj: &DetectedObject,
        timestamp: &str,
        embedding: Option<Arc<[f32]>>,
    ) -> Self {
        let (sw, sh) = frame.scale();
        Self {
            sensor_id: frame.stream_id,
            frame_id: frame.frame_number,
            timestamp: timestamp.to_string(),
            object_label: obj.class_label.clone(),
            tracking_id: obj.object_id,
            confidence: obj.confidence,
            bbox: obj.rect.scaled(sw, sh),
            embedding,
            extension: ObjectExtension::for_label(&obj.class_label),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// 本帧是否生成事件消息
pub fn is_message_frame(frame_number: i64, message_rate: u32) -> bool {
    message_rate > 0 && frame_number.rem_euclid(i64::from(message_rate)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::FrameSurface;

    fn frame() -> FrameMeta {
        FrameMeta {
            stream_id: 2,
            frame_number: 60,
            pts_ns: 0,
            source_uri: "file:///cam.mp4".into(),
            source_width: 1920,
            source_height: 1080,
            surface: FrameSurface::blank(960, 540),
            objects: Vec::new(),
        }
    }

    fn object(label: &str) -> DetectedObject {
        DetectedObject {
            object_id: 7,
            class_id: 0,
            class_label: label.into(),
            confidence: 0.8,
            rect: BoxRect::new(10.0, 20.0, 30.0, 40.0),
            embedding: None,
        }
    }

    #[test]
    fn test_bbox_scaled_to_source() {
        let msg = EventMessage::from_object(&frame(), &object("person"), "t", None);
        assert_eq!(msg.bbox, BoxRect::new(20.0, 40.0, 60.0, 80.0));
        assert_eq!(msg.sensor_id, 2);
        assert!(matches!(msg.extension, ObjectExtension::Person { .. }));
    }

    #[test]
    fn test_extension_by_label() {
        assert!(matches!(
            ObjectExtension::for_label("Car"),
            ObjectExtension::Vehicle { ref vehicle_type, .. } if vehicle_type == "Car"
        ));
        assert!(matches!(
            ObjectExtension::for_label("bottle"),
            ObjectExtension::Product { .. }
        ));
        assert_eq!(ObjectExtension::for_label("dog"), ObjectExtension::Unknown);
    }

    #[test]
    fn test_json_shape() {
        let embedding: Arc<[f32]> = Arc::from(vec![0.5f32, 1.0]);
        let msg = EventMessage::from_object(&frame(), &object("truck"), "t", Some(embedding));
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["extension"]["type"], "vehicle");
        assert_eq!(json["embedding"][1], 1.0);

        let msg = EventMessage::from_object(&frame(), &object("dog"), "t", None);
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert!(json.get("embedding").is_none());
        assert_eq!(json["extension"]["type"], "unknown");
    }

    #[test]
    fn test_message_rate() {
        assert!(is_message_frame(0, 30));
        assert!(is_message_frame(60, 30));
        assert!(!is_message_frame(61, 30));
        assert!(!is_message_frame(60, 0));
    }
}
