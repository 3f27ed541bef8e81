use ndarray::*;

/// BoundingBox represents an axis-aligned face box in pixel co-ordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Left of the bounding box (i.e. min-x)
    x: f32,
    /// Top of the bounding box (i.e. min-y)
    y: f32,
    /// Width of the bounding box
    width: f32,
    /// Height of the bounding box
    height: f32,
}

impl BoundingBox {
    /// Returns a new BoundingBox
    ///
    /// # Parameters
    ///
    /// * `x`: Bounding box left.
    /// * `y`: Bounding box top.
    /// * `width`: Bounding box width.
    /// * `height`: Bounding box height.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the x of the bounding box
    pub fn x(&self) -> f32 {
        self.x
    }

    /// Returns the y of the bounding box
    pub fn y(&self) -> f32 {
        self.y
    }

    /// Returns the width of the bounding box
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Returns the height of the bounding box
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Returns the area of the bounding box
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Returns true if the box has a non-positive width or height.
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Clamp the box to a `frame_width` x `frame_height` image.
    ///
    /// Returns `None` if nothing of the box remains inside the frame.
    pub fn clamp(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        let x1 = self.x.max(0.0);
        let y1 = self.y.max(0.0);
        let x2 = (self.x + self.width).min(frame_width as f32);
        let y2 = (self.y + self.height).min(frame_height as f32);

        let clamped = BoundingBox::new(x1, y1, x2 - x1, y2 - y1);
        (!clamped.is_empty()).then_some(clamped)
    }

    /// Returns the bounding box in left, top, width, height format, i.e., `(min x, min y, width, height)`.
    pub fn to_tlwh(&self) -> Array1<f32> {
        arr1::<f32>(&[self.x, self.y, self.width, self.height])
    }

    /// Returns the bounding box in top-left, bottom-right format, i.e., `(min x, min y, max x, max y)`.
    pub fn to_tlbr(&self) -> Array1<f32> {
        arr1::<f32>(&[self.x, self.y, self.x + self.width, self.y + self.height])
    }

    /// Returns the bounding box in center x, center y, aspect ratio, height format, where the aspect ratio is `width / height`.
    pub fn to_xyah(&self) -> Array1<f32> {
        arr1::<f32>(&[
            self.x + (self.width / 2.0),
            self.y + (self.height / 2.0),
            self.width / self.height,
            self.height,
        ])
    }

    /// Build a bounding box from center x, center y, aspect ratio, height format.
    pub fn from_xyah(xyah: ArrayView1<f32>) -> BoundingBox {
        let width = xyah[2] * xyah[3];
        let height = xyah[3];
        BoundingBox::new(
            xyah[0] - (width / 2.0),
            xyah[1] - (height / 2.0),
            width,
            height,
        )
    }
}
