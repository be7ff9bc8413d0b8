use glam::{ivec2, vec2, IVec2, Vec2};
use serde::{Deserialize, Serialize};

const SQRT3: f32 = 1.732_050_8;

/// Shape of the map cells.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Hash, Debug, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// Six directions, numbered 0 to 5 starting from upper left and going
    /// counterclockwise.
    #[default]
    Hex,
    /// Eight directions, numbered 0 to 7 starting from left and going
    /// counterclockwise.
    Square,
}

use Layout::*;

/// Sum of 1..=n.
pub const fn numerical_number(n: i32) -> i32 {
    if n & 1 != 0 {
        n * (n / 2 + 1)
    } else {
        n * n / 2 + n / 2
    }
}

/// One leg of an item footprint, a direction and a number of steps to walk
/// along it.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Hash, Debug, Serialize, Deserialize,
)]
pub struct BlockLine(pub u8, pub u8);

impl From<u8> for BlockLine {
    /// Unpack the compact form, direction in the high nibble and step count
    /// in the low nibble.
    fn from(b: u8) -> Self {
        BlockLine(b >> 4, b & 0xf)
    }
}

impl Layout {
    /// Number of directions.
    pub const fn dirs(self) -> i32 {
        match self {
            Hex => 6,
            Square => 8,
        }
    }

    /// Game distance between two cells.
    pub fn dist(self, a: IVec2, b: IVec2) -> i32 {
        match self {
            Hex => {
                let dx = (a.x - b.x).abs();
                let rx = if a.x & 1 == 0 {
                    if b.y <= a.y {
                        a.y - b.y - dx / 2
                    } else {
                        b.y - a.y - (dx + 1) / 2
                    }
                } else if b.y >= a.y {
                    b.y - a.y - dx / 2
                } else {
                    a.y - b.y - (dx + 1) / 2
                };
                dx + rx.max(0)
            }
            Square => (a.x - b.x).abs().max((a.y - b.y).abs()),
        }
    }

    /// Move one cell along a direction.
    ///
    /// The result may fall outside any map bounds. An invalid direction
    /// leaves the position unchanged.
    pub fn step(self, p: IVec2, dir: i32) -> IVec2 {
        let (mut x, mut y) = (p.x, p.y);
        match self {
            Hex => match dir {
                0 => {
                    x -= 1;
                    if x & 1 == 0 {
                        y -= 1;
                    }
                }
                1 => {
                    x -= 1;
                    if x & 1 != 0 {
                        y += 1;
                    }
                }
                2 => y += 1,
                3 => {
                    x += 1;
                    if x & 1 != 0 {
                        y += 1;
                    }
                }
                4 => {
                    x += 1;
                    if x & 1 == 0 {
                        y -= 1;
                    }
                }
                5 => y -= 1,
                _ => {}
            },
            Square => {
                let d = match dir {
                    0 => ivec2(-1, 0),
                    1 => ivec2(-1, 1),
                    2 => ivec2(0, 1),
                    3 => ivec2(1, 1),
                    4 => ivec2(1, 0),
                    5 => ivec2(1, -1),
                    6 => ivec2(0, -1),
                    7 => ivec2(-1, -1),
                    _ => IVec2::ZERO,
                };
                x += d.x;
                y += d.y;
            }
        }
        ivec2(x, y)
    }

    /// Planar position of a cell center.
    ///
    /// Adjacent hex centers are `2 * sqrt(3)` apart, adjacent square centers
    /// are 1 apart along the axes.
    pub fn center(self, p: IVec2) -> Vec2 {
        match self {
            Hex => vec2(
                3.0 * p.x as f32,
                2.0 * SQRT3 * p.y as f32 - SQRT3 * (p.x & 1) as f32,
            ),
            Square => p.as_vec2(),
        }
    }

    /// Direction sector that contains the bearing from `a` to `b`.
    pub fn far_dir(self, a: IVec2, b: IVec2) -> i32 {
        match self {
            Hex => {
                let d = self.center(b) - self.center(a);
                let deg = 180.0 + d.y.atan2(d.x).to_degrees();
                match deg {
                    d if (60.0..120.0).contains(&d) => 5,
                    d if (120.0..180.0).contains(&d) => 4,
                    d if (180.0..240.0).contains(&d) => 3,
                    d if (240.0..300.0).contains(&d) => 2,
                    d if d >= 300.0 => 1,
                    _ => 0,
                }
            }
            Square => {
                let deg = 180.0
                    + ((b.x - a.x) as f32).atan2((b.y - a.y) as f32).to_degrees();
                match deg {
                    d if (22.5..67.5).contains(&d) => 7,
                    d if (67.5..112.5).contains(&d) => 0,
                    d if (112.5..157.5).contains(&d) => 1,
                    d if (157.5..202.5).contains(&d) => 2,
                    d if (202.5..247.5).contains(&d) => 3,
                    d if (247.5..292.5).contains(&d) => 4,
                    d if (292.5..337.5).contains(&d) => 5,
                    _ => 6,
                }
            }
        }
    }

    /// Direction from `a` to an adjacent cell `b`.
    ///
    /// Falls back to 0 when the cells are not neighbors.
    pub fn near_dir(self, a: IVec2, b: IVec2) -> i32 {
        let (dx, dy) = ((b.x - a.x).signum(), (b.y - a.y).signum());
        match self {
            Hex if a.x & 1 != 0 => match (dx, dy) {
                (-1, -1) => 0,
                (-1, 0) => 1,
                (0, 1) => 2,
                (1, 0) => 3,
                (1, -1) => 4,
                (0, -1) => 5,
                _ => 0,
            },
            Hex => match (dx, dy) {
                (-1, 0) => 0,
                (-1, 1) => 1,
                (0, 1) => 2,
                (1, 1) => 3,
                (1, 0) => 4,
                (0, -1) => 5,
                _ => 0,
            },
            Square => match (dx, dy) {
                (-1, 0) => 0,
                (-1, 1) => 1,
                (0, 1) => 2,
                (1, 1) => 3,
                (1, 0) => 4,
                (1, -1) => 5,
                (0, -1) => 6,
                (-1, -1) => 7,
                _ => 0,
            },
        }
    }

    /// Direction pointing the opposite way.
    pub fn opposite(self, dir: i32) -> i32 {
        (dir + self.dirs() / 2) % self.dirs()
    }

    /// How many direction steps apart two directions are, from 0 (same
    /// direction) to `dirs / 2` (opposite directions).
    pub fn deviation(self, a: i32, b: i32) -> usize {
        let mut i = (a - b).abs();
        if i > self.dirs() / 2 {
            i = self.dirs() - i;
        }
        i as usize
    }

    /// Cells adjacent to `p` in direction order.
    pub fn neighbors(self, p: IVec2) -> impl Iterator<Item = IVec2> {
        (0..self.dirs()).map(move |d| self.step(p, d))
    }

    /// Cells at exactly `radius` distance from `center`.
    ///
    /// There are `dirs * radius` cells on the ring.
    pub fn ring(
        self,
        center: IVec2,
        radius: i32,
    ) -> impl Iterator<Item = IVec2> {
        // Legs of the ring walk as (direction, radius multiplier).
        let legs: &'static [(i32, i32)] = match self {
            Hex => &[(2, 1), (3, 1), (4, 1), (5, 1), (0, 1), (1, 1)],
            Square => &[(2, 1), (4, 2), (6, 2), (0, 2), (2, 1)],
        };
        let radius = radius.max(0);

        let mut start = center;
        for _ in 0..radius {
            start = self.step(start, 0);
        }

        legs.iter()
            .flat_map(move |&(dir, k)| {
                std::iter::repeat(dir).take((k * radius) as usize)
            })
            .scan(start, move |pos, dir| {
                let ret = *pos;
                *pos = self.step(*pos, dir);
                Some(ret)
            })
    }

    /// Cells within `radius` of `center`, the center itself excluded,
    /// ordered from the innermost ring outwards.
    pub fn area(
        self,
        center: IVec2,
        radius: i32,
    ) -> impl Iterator<Item = IVec2> {
        (1..=radius).flat_map(move |r| self.ring(center, r))
    }

    /// Number of cells `area` yields for `radius`.
    pub const fn area_len(self, radius: i32) -> usize {
        if radius <= 0 {
            return 0;
        }
        (numerical_number(radius) * self.dirs()) as usize
    }

    /// Cells covered by a footprint walked from `origin`.
    ///
    /// Walking stops at the first leg with an invalid direction or zero
    /// steps. Cells may fall outside map bounds and should be filtered by
    /// the caller.
    pub fn block_line_cells(
        self,
        origin: IVec2,
        lines: &[BlockLine],
    ) -> Vec<IVec2> {
        let mut ret = Vec::new();
        let mut pos = origin;
        for &BlockLine(dir, steps) in lines {
            if dir as i32 >= self.dirs() || steps == 0 {
                break;
            }
            for _ in 0..steps {
                pos = self.step(pos, dir as i32);
                ret.push(pos);
            }
        }
        ret
    }
}
