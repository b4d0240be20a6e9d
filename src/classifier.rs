use rand::Rng;

/// 单次分类的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub is_malicious: bool,
    pub confidence: f64,
}

/// 替换分类实现时必须保持 `/predict` 的响应格式不变
pub trait Classifier: Send + Sync {
    fn classify(&self, url: &str) -> Assessment;
}

/// 占位分类器：结果完全随机，不是真实模型
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomClassifier;

impl Classifier for RandomClassifier {
    fn classify(&self, _url: &str) -> Assessment {
        let mut rng = rand::thread_rng();
        Assessment {
            is_malicious: rng.gen_bool(0.5),
            confidence: rng.gen_range(0.0..1.0),
        }
    }
}
