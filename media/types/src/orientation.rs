/*!
    Display transforms and quarter-turn rotations.
*/

/**
    A clockwise rotation by a multiple of 90 degrees.

    Frames carry one of these as their orientation tag: the rotation that
    still has to be applied for the frame to display upright.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /**
        Snap an arbitrary angle in degrees to the nearest quarter turn.
    */
    pub fn from_degrees(degrees: f64) -> Self {
        let turns = (degrees / 90.0).round() as i64;
        match turns.rem_euclid(4) {
            0 => Self::Deg0,
            1 => Self::Deg90,
            2 => Self::Deg180,
            _ => Self::Deg270,
        }
    }

    pub const fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /**
        Returns true if applying this rotation exchanges width and height.
    */
    pub const fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/**
    A 2D affine display transform, laid out as
    `[a b 0; c d 0; tx ty 1]` (row-vector convention).

    Containers store this per video track to tell players how to present
    the decoded pixels; portrait phone recordings usually carry a 90 degree
    rotation here instead of rotated pixel data.
*/
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl DisplayTransform {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /**
        Build a pure rotation transform (no translation).
    */
    pub fn rotation(rotation: Rotation) -> Self {
        let (sin, cos) = match rotation {
            Rotation::Deg0 => (0.0, 1.0),
            Rotation::Deg90 => (1.0, 0.0),
            Rotation::Deg180 => (0.0, -1.0),
            Rotation::Deg270 => (-1.0, 0.0),
        };
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /**
        Angle of the transform in degrees, `atan2(b, a)`.
    */
    pub fn angle_degrees(&self) -> f64 {
        self.b.atan2(self.a).to_degrees()
    }

    /**
        The quarter turn nearest to this transform's angle.
    */
    pub fn quarter_turn(&self) -> Rotation {
        Rotation::from_degrees(self.angle_degrees())
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for DisplayTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
